use std::fmt;

/// Number of logical sections every crash log is split into
pub const SEGMENT_COUNT: usize = 6;

/// Terminal end marker: the last section runs to the end of the file
const EOF_MARKER: &str = "EOF";

/// Six sections in fixed order:
/// `[CompatibilitySettings, SystemSpecs, CallStack, Modules, XseModules, Plugins]`
pub type Segments = Vec<Vec<String>>;

/// Index of each section inside [`Segments`]
pub mod index {
    pub const CRASHGEN_SETTINGS: usize = 0;
    pub const SYSTEM_SPECS: usize = 1;
    pub const CALL_STACK: usize = 2;
    pub const MODULES: usize = 3;
    pub const XSE_MODULES: usize = 4;
    pub const PLUGINS: usize = 5;
}

/// Script extender that produced the XSE plugin section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XseFlavor {
    F4se,
    Skse,
}

impl XseFlavor {
    /// Detect from raw lines: any mention of `SKSE` selects Skyrim markers
    pub fn detect<S: AsRef<str>>(lines: &[S]) -> Self {
        if lines.iter().any(|line| line.as_ref().contains("SKSE")) {
            Self::Skse
        } else {
            Self::F4se
        }
    }

    pub fn acronym(self) -> &'static str {
        match self {
            Self::F4se => "F4SE",
            Self::Skse => "SKSE",
        }
    }

    fn plugins_marker(self) -> &'static str {
        match self {
            Self::F4se => "F4SE PLUGINS:",
            Self::Skse => "SKSE PLUGINS:",
        }
    }
}

impl fmt::Display for XseFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.acronym())
    }
}

/// Splits crash log lines into [`SEGMENT_COUNT`] sections.
///
/// A single left-to-right pass walks an ordered list of `(start, end)` marker
/// pairs. Markers are prefix-matched against the left-trimmed line; collected
/// lines are trimmed and blank ones dropped. An end marker may also be the next
/// pair's start marker (`MODULES:` closes the call stack and opens the modules
/// section), so a closing line is re-checked as an opening line.
#[derive(Debug, Clone)]
pub struct SegmentExtractor {
    boundaries: Vec<(&'static str, &'static str)>,
}

impl SegmentExtractor {
    pub fn new(flavor: XseFlavor) -> Self {
        let xse_marker = flavor.plugins_marker();
        Self {
            boundaries: vec![
                ("[Compatibility]", "SYSTEM SPECS:"),
                ("SYSTEM SPECS:", "PROBABLE CALL STACK:"),
                ("PROBABLE CALL STACK:", "MODULES:"),
                ("MODULES:", xse_marker),
                (xse_marker, "PLUGINS:"),
                ("PLUGINS:", EOF_MARKER),
            ],
        }
    }

    /// Pick the marker set from the lines, then extract
    pub fn extract_from<S: AsRef<str>>(lines: &[S]) -> Segments {
        Self::new(XseFlavor::detect(lines)).extract(lines)
    }

    /// Always returns exactly [`SEGMENT_COUNT`] segments; sections whose
    /// markers never matched come back empty.
    pub fn extract<S: AsRef<str>>(&self, lines: &[S]) -> Segments {
        let mut segments: Segments = Vec::with_capacity(SEGMENT_COUNT);
        let mut boundary = 0;
        let mut collecting = false;
        let mut start = 0;

        for (i, line) in lines.iter().enumerate() {
            if boundary >= self.boundaries.len() {
                break;
            }
            let probe = line.as_ref().trim_start();
            let (start_marker, end_marker) = self.boundaries[boundary];

            if collecting {
                if !probe.starts_with(end_marker) {
                    continue;
                }
                segments.push(clean(&lines[start..i]));
                boundary += 1;
                collecting = false;

                match self.boundaries.get(boundary) {
                    Some(&(next_start, _)) if probe.starts_with(next_start) => {}
                    _ => continue,
                }
            } else if !probe.starts_with(start_marker) {
                continue;
            }

            // Entering a section at line `i`
            collecting = true;
            start = i + 1;
            if self.boundaries[boundary].1 == EOF_MARKER {
                segments.push(clean(&lines[start..]));
                collecting = false;
                break;
            }
        }

        // Truncated file: keep whatever the open section collected
        if collecting {
            segments.push(clean(&lines[start..]));
        }

        segments.resize_with(SEGMENT_COUNT, Vec::new);
        segments
    }
}

impl Default for SegmentExtractor {
    fn default() -> Self {
        Self::new(XseFlavor::F4se)
    }
}

fn clean<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
