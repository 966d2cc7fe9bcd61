// This module provides the per-run state of the offload pass. OffloadSession is owned by a
// single pass invocation and threaded explicitly through the rewriter, so the pass keeps no
// global state and stays reentrant. It generates unique names for the result variables bound
// around each synthesized runtime call (prefix$N, counted per prefix), remembers which region
// is currently being synthesized for diagnostics, and accumulates SessionStats: regions
// offloaded, placeholders reserved and resolved, sections scanned in the device object and the
// size of the embedded device code. SessionStats implements Display for the CLI's --stats
// summary.

//! Per-run offload session management.
//!
//! This module tracks the bookkeeping that outlives a single region but not
//! a single pass run: unique names and statistics.

use hashbrown::HashMap;
use std::fmt;

/// Offload session state.
#[derive(Debug, Default)]
pub struct OffloadSession {
    /// Session statistics for diagnostics.
    stats: SessionStats,

    /// Next suffix per unique-name prefix.
    name_counters: HashMap<String, u32>,

    /// Region being synthesized.
    current_region: Option<String>,
}

impl OffloadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a fresh name of the form `prefix$N`.
    pub fn unique_name(&mut self, prefix: &str) -> String {
        let counter = self.name_counters.entry_ref(prefix).or_insert(0);
        let name = format!("{prefix}${counter}");
        *counter += 1;
        name
    }

    /// Set the region currently being synthesized.
    pub fn set_current_region(&mut self, name: &str) {
        self.current_region = Some(name.to_string());
    }

    pub fn current_region(&self) -> Option<&str> {
        self.current_region.as_deref()
    }

    /// Mark the current region as offloaded.
    pub fn finish_region(&mut self) {
        if let Some(name) = self.current_region.take() {
            log::debug!("Offloaded region {name}");
            self.stats.regions_offloaded += 1;
        }
    }

    pub fn record_reserved(&mut self) {
        self.stats.placeholders_reserved += 1;
    }

    pub fn record_resolved(&mut self, count: usize) {
        self.stats.placeholders_resolved += count;
    }

    pub fn record_sections_scanned(&mut self, count: usize) {
        self.stats.sections_scanned += count;
    }

    pub fn record_device_code(&mut self, bytes: usize) {
        self.stats.device_code_bytes = bytes;
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn into_stats(self) -> SessionStats {
        self.stats
    }
}

/// Offload statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Device-tagged regions replaced by remote calls.
    pub regions_offloaded: usize,
    /// Placeholders created, including the runtime init placeholder.
    pub placeholders_reserved: usize,
    /// Placeholders matched to a section.
    pub placeholders_resolved: usize,
    /// Sections enumerated in the compiled device object.
    pub sections_scanned: usize,
    /// Size of the embedded device object.
    pub device_code_bytes: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Offload Statistics:")?;
        writeln!(f, "  Regions offloaded: {}", self.regions_offloaded)?;
        writeln!(f, "  Placeholders reserved: {}", self.placeholders_reserved)?;
        writeln!(f, "  Placeholders resolved: {}", self.placeholders_resolved)?;
        writeln!(f, "  Sections scanned: {}", self.sections_scanned)?;
        write!(f, "  Device code size: {} bytes", self.device_code_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_count_per_prefix() {
        let mut session = OffloadSession::new();
        assert_eq!(session.unique_name("remote_run_result"), "remote_run_result$0");
        assert_eq!(session.unique_name("remote_run_result"), "remote_run_result$1");
        assert_eq!(session.unique_name("init_result"), "init_result$0");
    }

    #[test]
    fn finishing_a_region_counts_once() {
        let mut session = OffloadSession::new();
        session.set_current_region("f.s0.y");
        assert_eq!(session.current_region(), Some("f.s0.y"));
        session.finish_region();
        session.finish_region();
        assert_eq!(session.stats().regions_offloaded, 1);
        assert_eq!(session.current_region(), None);
    }
}
