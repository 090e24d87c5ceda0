/// Layout of the rendered text report.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Narrowest label column, even when every label is shorter.
    pub min_label_width: usize,
    /// Extra indentation per tree level.
    pub indent_step: usize,
    /// Fraction of a parent's time its uncategorized remainder must exceed
    /// before an "(other)" row is printed.
    pub other_threshold: f64,
    /// Digits after the decimal point for durations.
    pub precision: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            min_label_width: 10,
            indent_step: 3,
            other_threshold: 0.01,
            precision: 3,
        }
    }
}

/// Settings of one timer context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub render: RenderConfig,
}
