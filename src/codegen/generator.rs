//! # Wrapper Module Generation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::debug;

use super::imports::{relative_specifier, rewrite_relative_imports};
use super::pieces::CodePiece;
use super::GenerateMode;
use crate::functions::{FunctionDescriptor, FunctionError, FunctionResult};
use crate::observability::Event;

const TEMPLATE: &str = include_str!("template.js");
const RUNNER: &str = include_str!("runner.js");

/// Prefix of the stdout line carrying a local invocation's response
pub const RESPONSE_MARKER: &str = "__FNCTL_RESPONSE__";

/// Assembles wrapper modules from code pieces and the entry-point template
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    project_root: PathBuf,
    overrides: BTreeMap<CodePiece, PathBuf>,
    parameters: Map<String, Value>,
}

impl CodeGenerator {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            overrides: BTreeMap::new(),
            parameters: Map::new(),
        }
    }

    /// Register piece overrides from the config `code` section.
    ///
    /// Paths are relative to the project root. Unknown keys are rejected.
    pub fn with_overrides(mut self, code: &BTreeMap<String, String>) -> FunctionResult<Self> {
        for (key, path) in code {
            let piece: CodePiece = key.parse().map_err(FunctionError::Config)?;
            self.overrides.insert(piece, self.project_root.join(path));
        }
        Ok(self)
    }

    /// Extra `$metadata` entry, such as the deployment region
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Directory the generated module must be written to for `mode`
    pub fn module_dir<'a>(&'a self, descriptor: &'a FunctionDescriptor, mode: GenerateMode) -> &'a Path {
        match mode {
            GenerateMode::Packaged => &self.project_root,
            GenerateMode::Local => &descriptor.directory,
        }
    }

    /// Generate the wrapper module text for one function.
    ///
    /// In local mode the user source is read fresh from disk and inlined.
    pub async fn generate(
        &self,
        descriptor: &FunctionDescriptor,
        stage: &str,
        mode: GenerateMode,
    ) -> FunctionResult<String> {
        let user_code = match mode {
            GenerateMode::Packaged => {
                let specifier = relative_specifier(&self.project_root, &descriptor.entry_file());
                format!("import $handler from {};", Value::from(specifier))
            }
            GenerateMode::Local => {
                let entry = descriptor.entry_file();
                let source = tokio::fs::read_to_string(&entry)
                    .await
                    .map_err(|e| FunctionError::read(&entry, e))?;
                inline_default_export(&source, &entry)?
            }
        };

        let mut pieces = Vec::with_capacity(CodePiece::ALL.len());
        for piece in CodePiece::ALL {
            pieces.push(self.load_piece(piece, descriptor, mode).await?);
        }

        let mut module = String::new();
        module.push_str(&format!(
            "// Generated by fnctl for \"{}\" ({} stage). Do not edit.\n\n",
            descriptor.name, stage
        ));
        module.push_str(&user_code);
        module.push_str("\n\n");
        module.push_str(&pieces.join("\n"));
        module.push_str(&format!(
            "\nconst $metadata = Object.freeze({});\n\n$initialize();\n\n",
            self.metadata(descriptor, stage)
        ));
        module.push_str(TEMPLATE);

        if mode == GenerateMode::Local {
            module.push('\n');
            module.push_str(&RUNNER.replace("$RESPONSE_MARKER", RESPONSE_MARKER));
        }

        debug!(
            event = %Event::CodeGenerated,
            function = %descriptor.name,
            stage,
            mode = ?mode,
            bytes = module.len(),
        );

        Ok(module)
    }

    async fn load_piece(
        &self,
        piece: CodePiece,
        descriptor: &FunctionDescriptor,
        mode: GenerateMode,
    ) -> FunctionResult<String> {
        let Some(path) = self.overrides.get(&piece) else {
            return Ok(piece.default_source(mode).to_string());
        };

        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FunctionError::read(path, e))?;

        if !source.contains(&piece.function_name()) {
            return Err(FunctionError::Compile(format!(
                "{} does not define {}",
                path.display(),
                piece.function_name()
            )));
        }

        let module_dir = self.module_dir(descriptor, mode);
        if module_dir == self.project_root {
            Ok(source)
        } else {
            Ok(rewrite_relative_imports(
                &source,
                &self.project_root,
                module_dir,
            ))
        }
    }

    fn metadata(&self, descriptor: &FunctionDescriptor, stage: &str) -> Value {
        let mut metadata = Map::new();
        // Extra parameters first so they cannot shadow the fixed keys.
        for (key, value) in &self.parameters {
            metadata.insert(key.clone(), value.clone());
        }
        metadata.insert("stage".into(), json!(stage));
        metadata.insert(
            "function".into(),
            json!({
                "name": descriptor.name,
                "path": descriptor.path,
                "method": descriptor.method.as_str(),
            }),
        );
        Value::Object(metadata)
    }
}

fn inline_default_export(source: &str, entry: &Path) -> FunctionResult<String> {
    if !source.contains("export default") {
        return Err(FunctionError::Compile(format!(
            "{} has no default export",
            entry.display()
        )));
    }
    Ok(source.replacen("export default", "const $handler =", 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::HttpMethod;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, FunctionDescriptor) {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("api/ping");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("index.js"),
            "export default async () => ({ pong: true })\n",
        )
        .unwrap();
        let descriptor = FunctionDescriptor::new("ping", &dir).with_route(HttpMethod::Get, "/ping");
        (temp, descriptor)
    }

    #[tokio::test]
    async fn test_generation_is_deterministic() {
        let (temp, descriptor) = fixture();
        let generator = CodeGenerator::new(temp.path()).with_parameter("region", "eu-west-1");

        for mode in [GenerateMode::Packaged, GenerateMode::Local] {
            let first = generator.generate(&descriptor, "dev", mode).await.unwrap();
            let second = generator.generate(&descriptor, "dev", mode).await.unwrap();
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_packaged_imports_user_module() {
        let (temp, descriptor) = fixture();
        let module = CodeGenerator::new(temp.path())
            .generate(&descriptor, "prod", GenerateMode::Packaged)
            .await
            .unwrap();

        assert!(module.contains(r#"import $handler from "./api/ping/index.js";"#));
        assert!(module.contains("export async function handler(event, context, callback)"));
        assert!(!module.contains(RESPONSE_MARKER));
        assert!(!module.contains("process.on("));
    }

    #[tokio::test]
    async fn test_local_inlines_user_code() {
        let (temp, descriptor) = fixture();
        let module = CodeGenerator::new(temp.path())
            .generate(&descriptor, "dev", GenerateMode::Local)
            .await
            .unwrap();

        assert!(module.contains("const $handler = async () => ({ pong: true })"));
        assert!(module.contains(RESPONSE_MARKER));
        assert!(module.contains(r#""stage":"dev""#));
    }

    #[tokio::test]
    async fn test_pieces_emitted_in_order() {
        let (temp, descriptor) = fixture();
        let module = CodeGenerator::new(temp.path())
            .generate(&descriptor, "dev", GenerateMode::Packaged)
            .await
            .unwrap();

        let positions: Vec<usize> = CodePiece::ALL
            .iter()
            .map(|p| module.find(&format!("function {}(", p.function_name())).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[tokio::test]
    async fn test_override_imports_rewritten_in_local_mode() {
        let (temp, descriptor) = fixture();
        fs::create_dir_all(temp.path().join("hooks")).unwrap();
        fs::write(
            temp.path().join("hooks/onCall.js"),
            "import db from './lib/db.js'\nasync function $onCall(event, context) { await db.connect() }\n",
        )
        .unwrap();

        let mut code = BTreeMap::new();
        code.insert("onCall".to_string(), "hooks/onCall.js".to_string());
        let generator = CodeGenerator::new(temp.path()).with_overrides(&code).unwrap();

        let local = generator
            .generate(&descriptor, "dev", GenerateMode::Local)
            .await
            .unwrap();
        assert!(local.contains("import db from '../../lib/db.js'"));

        let packaged = generator
            .generate(&descriptor, "dev", GenerateMode::Packaged)
            .await
            .unwrap();
        assert!(packaged.contains("import db from './lib/db.js'"));
    }

    #[tokio::test]
    async fn test_missing_override_is_a_read_failure() {
        let (temp, descriptor) = fixture();
        let mut code = BTreeMap::new();
        code.insert("finally".to_string(), "hooks/missing.js".to_string());
        let generator = CodeGenerator::new(temp.path()).with_overrides(&code).unwrap();

        let err = generator
            .generate(&descriptor, "dev", GenerateMode::Packaged)
            .await
            .unwrap_err();
        assert!(matches!(err, FunctionError::Read { .. }));
    }

    #[test]
    fn test_unknown_override_key() {
        let mut code = BTreeMap::new();
        code.insert("onSuccess".to_string(), "hooks/x.js".to_string());
        let err = CodeGenerator::new("/p").with_overrides(&code).unwrap_err();
        assert!(matches!(err, FunctionError::Config(_)));
    }
}
