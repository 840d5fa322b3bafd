//! Packaged wrapper modules and their archives

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::sync::Arc;

use fnctl::bundle::PassthroughCompiler;
use fnctl::codegen::{CodeGenerator, GenerateMode};
use fnctl::deploy::{DeploySettings, Deployer, MemoryPlatform, ZipArchiver};
use fnctl::functions::{FunctionDescriptor, HttpMethod};
use tempfile::TempDir;

fn settings() -> DeploySettings {
    DeploySettings {
        project: "shop".into(),
        stage: "prod".into(),
        role: "arn:aws:iam::123456789012:role/lambda".into(),
        runtime: "nodejs20.x".into(),
        env: BTreeMap::new(),
        tags: BTreeMap::new(),
        ..Default::default()
    }
}

fn fixture() -> (TempDir, FunctionDescriptor) {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("src/orders");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("index.js"), "export default () => []").unwrap();
    let descriptor =
        FunctionDescriptor::new("orders", dir).with_route(HttpMethod::Get, "/orders");
    (temp, descriptor)
}

fn entry(package: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(package)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut contents = String::new();
    file.read_to_string(&mut contents).unwrap();
    contents
}

#[tokio::test]
async fn package_holds_the_generated_entry_point() {
    let (temp, descriptor) = fixture();
    let generator = CodeGenerator::new(temp.path()).with_parameter("region", "eu-west-1");
    let deployer = Deployer::new(
        Arc::new(MemoryPlatform::new()),
        generator,
        Arc::new(PassthroughCompiler),
        Arc::new(ZipArchiver),
        settings(),
    )
    .unwrap();

    let package = deployer.package(&descriptor).await.unwrap();
    let index = entry(&package, "index.js");

    assert!(index.contains(r#"import $handler from "./src/orders/index.js";"#));
    assert!(index.contains(r#""region":"eu-west-1""#));
    assert!(index.contains(r#""stage":"prod""#));
    assert!(index.contains("export async function handler(event, context, callback)"));
    assert!(!index.contains("process.on('uncaughtException'"));

    // Generated modules never outlive packaging.
    let leftovers: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(".fnctl"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn packaging_is_reproducible() {
    let (temp, descriptor) = fixture();
    let deployer = Deployer::new(
        Arc::new(MemoryPlatform::new()),
        CodeGenerator::new(temp.path()),
        Arc::new(PassthroughCompiler),
        Arc::new(ZipArchiver),
        settings(),
    )
    .unwrap();

    let first = deployer.package(&descriptor).await.unwrap();
    let second = deployer.package(&descriptor).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn local_and_packaged_modules_differ_only_in_how_user_code_arrives() {
    let (temp, descriptor) = fixture();
    let generator = CodeGenerator::new(temp.path());

    let packaged = generator
        .generate(&descriptor, "dev", GenerateMode::Packaged)
        .await
        .unwrap();
    let local = generator
        .generate(&descriptor, "dev", GenerateMode::Local)
        .await
        .unwrap();

    assert!(packaged.contains("import $handler from"));
    assert!(local.contains("const $handler = () => []"));
    assert!(local.contains("__FNCTL_RESPONSE__"));
    assert!(!packaged.contains("__FNCTL_RESPONSE__"));
}
