//! Text rendering of collected timer trees.
//!
//! All threads of a report share one time unit, picked from the longest
//! top-level duration. Each thread gets its own label column, wide enough for
//! its header and every label below it. Siblings are listed longest first;
//! time a parent spent outside its children shows up as an "(other)" row when
//! it is a noticeable share of the parent.

use std::fmt;
use std::time::Duration;

use crate::config::RenderConfig;
use crate::node::IntervalNode;

/// Header of the section belonging to the thread that requested the report.
pub const MAIN_THREAD_HEADER: &str = "Main thread";

const OTHER_LABEL: &str = "(other)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    /// The coarsest unit that still shows `largest` as a value below 1000,
    /// starting from milliseconds.
    pub fn for_largest(largest: Duration) -> Self {
        let secs = largest.as_secs_f64();
        [TimeUnit::Milliseconds, TimeUnit::Seconds, TimeUnit::Minutes]
            .into_iter()
            .find(|unit| secs * unit.per_second() < 1000.0)
            .unwrap_or(TimeUnit::Hours)
    }

    fn per_second(self) -> f64 {
        match self {
            TimeUnit::Milliseconds => 1000.0,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 1.0 / 60.0,
            TimeUnit::Hours => 1.0 / 3600.0,
        }
    }

    pub fn scale(self, d: Duration) -> f64 {
        d.as_secs_f64() * self.per_second()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "hr",
        }
    }
}

/// The collected tree of one thread.
#[derive(Debug, Clone)]
pub struct ThreadTree {
    header: String,
    root: IntervalNode,
}

impl ThreadTree {
    pub fn new(header: impl Into<String>, root: IntervalNode) -> Self {
        Self {
            header: header.into(),
            root,
        }
    }

    /// Label printed in place of the unnamed top-level node.
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn root(&self) -> &IntervalNode {
        &self.root
    }
}

/// A snapshot of collected timings, renderable with `Display`.
#[derive(Debug, Clone)]
pub struct Report {
    threads: Vec<ThreadTree>,
    config: RenderConfig,
}

impl Report {
    pub fn new(threads: Vec<ThreadTree>) -> Self {
        Self {
            threads,
            config: RenderConfig::default(),
        }
    }

    pub fn with_render_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn render_config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn threads(&self) -> &[ThreadTree] {
        &self.threads
    }

    pub fn thread(&self, header: &str) -> Option<&ThreadTree> {
        self.threads.iter().find(|t| t.header == header)
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Longest top-level duration over all threads.
    pub fn largest_total_time(&self) -> Duration {
        self.threads
            .iter()
            .map(|t| t.root.elapsed())
            .max()
            .unwrap_or_default()
    }

    pub fn unit(&self) -> TimeUnit {
        TimeUnit::for_largest(self.largest_total_time())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.threads.is_empty() {
            return writeln!(f, "No timings to report.");
        }

        let n = self.threads.len();
        writeln!(
            f,
            "Collected timer info from {} thread{}",
            n,
            if n == 1 { "" } else { "s" }
        )?;
        let unit = self.unit();
        writeln!(f, "Timing report, all times in [{}]:", unit.symbol())?;

        for thread in &self.threads {
            let width = self
                .config
                .min_label_width
                .max(thread.header.chars().count())
                .max(thread.root.max_label_length());
            let layout = Layout {
                width,
                unit,
                config: &self.config,
            };
            layout.write_node(f, &thread.root, &thread.header, 0)?;
        }
        Ok(())
    }
}

struct Layout<'a> {
    width: usize,
    unit: TimeUnit,
    config: &'a RenderConfig,
}

impl Layout<'_> {
    fn write_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        node: &IntervalNode,
        label: &str,
        indent: usize,
    ) -> fmt::Result {
        if node.calls() == 0 && node.children().is_empty() {
            return Ok(());
        }

        writeln!(
            f,
            "{:indent$}{:<width$}  {:>10.prec$} ({})",
            "",
            label,
            self.unit.scale(node.elapsed()),
            node.calls(),
            indent = indent,
            width = self.width,
            prec = self.config.precision,
        )?;

        let mut children: Vec<&IntervalNode> = node.children().iter().collect();
        children.sort_by(|a, b| b.elapsed().cmp(&a.elapsed()));

        let child_indent = indent + self.config.indent_step;
        for child in &children {
            self.write_node(f, child, child.label(), child_indent)?;
        }

        if !children.is_empty() {
            let residual = node.residual();
            let threshold = node.elapsed().as_secs_f64() * self.config.other_threshold;
            if residual.as_secs_f64() > threshold {
                writeln!(
                    f,
                    "{:indent$}{:<width$}  {:>10.prec$}",
                    "",
                    OTHER_LABEL,
                    self.unit.scale(residual),
                    indent = child_indent,
                    width = self.width,
                    prec = self.config.precision,
                )?;
            }
        }
        Ok(())
    }
}
