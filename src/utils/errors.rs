use std::path::PathBuf;
use thiserror::Error;

/// Location details attached to a parse or build error
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code_snippet: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_snippet(mut self, snippet: String) -> Self {
        self.code_snippet = Some(snippet);
        self
    }

    /// Fill line, column and a one-line snippet from a byte offset into `source`.
    pub fn at_offset(self, source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        let snippet = source[line_start..]
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();

        self.with_location(line, column).with_snippet(snippet)
    }
}

#[derive(Error, Debug)]
pub enum KilnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Build error: {message}")]
    Build {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Copy failed for {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<KilnError>,
    },
}

impl KilnError {
    /// Create a parse error with context
    pub fn parse_with_context(message: String, context: ErrorContext) -> Self {
        Self::Parse {
            message,
            context: Some(context),
        }
    }

    /// Create a simple build error without context
    pub fn build(message: String) -> Self {
        Self::Build {
            message,
            context: None,
        }
    }

    pub fn build_with_context(message: String, context: ErrorContext) -> Self {
        Self::Build {
            message,
            context: Some(context),
        }
    }

    pub fn config(message: String) -> Self {
        Self::Config(message)
    }

    pub fn copy(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Copy {
            path: path.into(),
            source,
        }
    }

    /// Format error with enhanced context display
    pub fn format_detailed(&self) -> String {
        match self {
            KilnError::Parse { message, context } => {
                self.format_error_with_context("Parse Error", message, context)
            }
            KilnError::Build { message, context } => {
                self.format_error_with_context("Build Error", message, context)
            }
            KilnError::Step { source, .. } => source.format_detailed(),
            _ => self.to_string(),
        }
    }

    fn format_error_with_context(
        &self,
        error_type: &str,
        message: &str,
        context: &Option<ErrorContext>,
    ) -> String {
        let mut output = format!("{}: {}", error_type, message);

        if let Some(ctx) = context {
            if let Some(ref file_path) = ctx.file_path {
                output.push_str(&format!("\n  File: {}", file_path.display()));
            }

            if let (Some(line), Some(column)) = (ctx.line, ctx.column) {
                output.push_str(&format!("\n  Location: line {}, column {}", line, column));
            }

            if let Some(ref snippet) = ctx.code_snippet {
                let line_num = ctx.line.unwrap_or(1);
                output.push_str(&format!("\n  {:4} │ {}", line_num, snippet));
                if let Some(column) = ctx.column {
                    output.push_str(&format!("\n       │ {}^", " ".repeat(column.saturating_sub(1))));
                }
            }
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, KilnError>;

impl From<notify::Error> for KilnError {
    fn from(err: notify::Error) -> Self {
        KilnError::Watch(err.to_string())
    }
}

impl From<serde_json::Error> for KilnError {
    fn from(err: serde_json::Error) -> Self {
        KilnError::config(err.to_string())
    }
}
