//! Lifecycle code pieces
//!
//! Each piece defines one `$<key>` function in the generated module. The
//! order of [`CodePiece::ALL`] is the order they are emitted in.

use std::fmt;
use std::str::FromStr;

use super::GenerateMode;

/// A named lifecycle hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CodePiece {
    Initialize,
    CatchUnhandledErrors,
    OnCall,
    CreateFunctionParameters,
    OnReturn,
    CreateResponse,
    Headers,
    OnError,
    CreateErrorResponse,
    Finally,
}

impl CodePiece {
    /// All pieces, in emission order
    pub const ALL: [CodePiece; 10] = [
        CodePiece::Initialize,
        CodePiece::CatchUnhandledErrors,
        CodePiece::OnCall,
        CodePiece::CreateFunctionParameters,
        CodePiece::OnReturn,
        CodePiece::CreateResponse,
        CodePiece::Headers,
        CodePiece::OnError,
        CodePiece::CreateErrorResponse,
        CodePiece::Finally,
    ];

    /// Key used under `code` in the config file
    pub fn key(&self) -> &'static str {
        match self {
            CodePiece::Initialize => "initialize",
            CodePiece::CatchUnhandledErrors => "catchUnhandledErrors",
            CodePiece::OnCall => "onCall",
            CodePiece::CreateFunctionParameters => "createFunctionParameters",
            CodePiece::OnReturn => "onReturn",
            CodePiece::CreateResponse => "createResponse",
            CodePiece::Headers => "headers",
            CodePiece::OnError => "onError",
            CodePiece::CreateErrorResponse => "createErrorResponse",
            CodePiece::Finally => "finally",
        }
    }

    /// Identifier the piece must define
    pub fn function_name(&self) -> String {
        format!("${}", self.key())
    }

    /// Built-in source for this piece
    pub fn default_source(&self, mode: GenerateMode) -> &'static str {
        match self {
            CodePiece::Initialize => include_str!("pieces/initialize.js"),
            CodePiece::CatchUnhandledErrors => match mode {
                GenerateMode::Local => include_str!("pieces/catchUnhandledErrors.js"),
                GenerateMode::Packaged => include_str!("pieces/catchUnhandledErrors.packaged.js"),
            },
            CodePiece::OnCall => include_str!("pieces/onCall.js"),
            CodePiece::CreateFunctionParameters => {
                include_str!("pieces/createFunctionParameters.js")
            }
            CodePiece::OnReturn => include_str!("pieces/onReturn.js"),
            CodePiece::CreateResponse => include_str!("pieces/createResponse.js"),
            CodePiece::Headers => include_str!("pieces/headers.js"),
            CodePiece::OnError => include_str!("pieces/onError.js"),
            CodePiece::CreateErrorResponse => include_str!("pieces/createErrorResponse.js"),
            CodePiece::Finally => include_str!("pieces/finally.js"),
        }
    }
}

impl FromStr for CodePiece {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CodePiece::ALL
            .iter()
            .copied()
            .find(|piece| piece.key() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = CodePiece::ALL.iter().map(|p| p.key()).collect();
                format!(
                    "unknown code piece \"{}\" (expected one of: {})",
                    s,
                    known.join(", ")
                )
            })
    }
}

impl fmt::Display for CodePiece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
