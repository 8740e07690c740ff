use crate::utils::{KilnError, Result};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

/// JavaScript minification using oxc: compress, then print without whitespace.
pub struct OxcMinifier;

impl OxcMinifier {
    pub fn new() -> Self {
        Self
    }

    /// Minify a complete script
    pub fn minify(&self, source_code: &str, filename: &str) -> Result<String> {
        let allocator = Allocator::default();
        let source_type = SourceType::from_path(filename).unwrap_or_default();

        let parse_result = Parser::new(&allocator, source_code, source_type).parse();

        if !parse_result.errors.is_empty() {
            let errors: Vec<String> = parse_result
                .errors
                .iter()
                .map(|e| format!("Parse error: {}", e))
                .collect();
            return Err(KilnError::build(errors.join("\n")));
        }

        let mut program = parse_result.program;
        let options = MinifierOptions {
            mangle: None,
            compress: Some(CompressOptions::default()),
        };
        Minifier::new(options).minify(&allocator, &mut program);

        let codegen_options = CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        };

        Ok(Codegen::new().with_options(codegen_options).build(&program).code)
    }

    pub fn stats(&self, original: &str, minified: &str) -> MinificationStats {
        MinificationStats {
            original_size: original.len(),
            minified_size: minified.len(),
            reduction_percentage: calculate_reduction(original, minified),
        }
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimate size reduction percentage
fn calculate_reduction(original: &str, minified: &str) -> f64 {
    let original_size = original.len() as f64;
    let minified_size = minified.len() as f64;

    if original_size == 0.0 {
        return 0.0;
    }

    ((original_size - minified_size) / original_size) * 100.0
}

#[derive(Debug, Clone)]
pub struct MinificationStats {
    pub original_size: usize,
    pub minified_size: usize,
    pub reduction_percentage: f64,
}

impl std::fmt::Display for MinificationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Minification: {:.1}% reduction ({} → {} bytes)",
            self.reduction_percentage, self.original_size, self.minified_size
        )
    }
}
