use clap::ValueEnum;

/// How the final outcome report is printed.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    /// One line per file as it finishes, then a summary line
    Text,
    /// Ordered outcome records as JSON on stdout
    Json,
}
