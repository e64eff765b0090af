// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Human-readable progress output. Purely observational.

use crate::partition::PartitionPlan;
use crate::report::RunReport;
use crate::task_record::{ParticipantId, TaskRecord};

pub trait Reporter: Send {
    fn batch_generated(&mut self, _rank: ParticipantId, _records: &[TaskRecord]) {}

    fn task_started(&mut self, _rank: ParticipantId, _record: &TaskRecord) {}

    fn participant_finished(&mut self, _participant: ParticipantId) {}

    fn shutdown_progress(&mut self, _rank: ParticipantId, _finished: usize, _total: usize) {}

    fn batch_completed(&mut self, _rank: ParticipantId, _records: &[TaskRecord]) {}

    fn partition_plan(&mut self, _plan: &PartitionPlan) {}

    fn run_summary(&mut self, _report: &RunReport) {}
}

/// Discards every notice
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// Prints progress lines to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter {
    /// Print every batch entry instead of a truncated listing
    pub full_listing: bool,
}

const LISTING_LIMIT: usize = 32;

impl ConsoleReporter {
    pub fn new(full_listing: bool) -> Self {
        Self { full_listing }
    }

    fn listing(&self, records: &[TaskRecord]) -> String {
        let shown = if self.full_listing {
            records.len()
        } else {
            records.len().min(LISTING_LIMIT)
        };
        let mut out = records[..shown]
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        if shown < records.len() {
            out.push_str(&format!(", ... ({} more)", records.len() - shown));
        }
        out
    }
}

impl Reporter for ConsoleReporter {
    fn batch_generated(&mut self, rank: ParticipantId, records: &[TaskRecord]) {
        println!("[{}] MAIN WORKLOAD: {{{}}}", rank, self.listing(records));
    }

    fn task_started(&mut self, rank: ParticipantId, record: &TaskRecord) {
        println!("[{}] new workload: {} (kind {})", rank, record.id, record.kind);
    }

    fn participant_finished(&mut self, participant: ParticipantId) {
        println!("##### Finishing worker {}", participant);
    }

    fn shutdown_progress(&mut self, rank: ParticipantId, finished: usize, total: usize) {
        println!("[{}] {}/{} finished", rank, finished, total);
    }

    fn batch_completed(&mut self, rank: ParticipantId, records: &[TaskRecord]) {
        println!("[{}] FINAL WORKLOAD: {{{}}}", rank, self.listing(records));
    }

    fn partition_plan(&mut self, plan: &PartitionPlan) {
        println!(
            "Average: {:.3}   std dev: {:.3}   upper bound: {:.3}",
            plan.mean_per_participant, plan.stddev, plan.upper_bound
        );
        let sizes = plan
            .sizes
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" | ");
        println!("Partition sizes: {}", sizes);
    }

    fn run_summary(&mut self, report: &RunReport) {
        println!();
        for (kind, stats) in report.per_kind.iter().enumerate() {
            println!(
                "Type {}:\tn={}\ttot={:.3}\tavg={:.3}",
                kind,
                stats.count,
                stats.total.as_secs_f64(),
                stats.average().as_secs_f64()
            );
        }
        println!();
        for (rank, stats) in report.per_participant.iter().enumerate() {
            println!(
                "Node {}:\tn={}\ttot={:.3}\tavg={:.3}",
                rank,
                stats.count,
                stats.total.as_secs_f64(),
                stats.average().as_secs_f64()
            );
        }
        println!(
            "\nTotal execution time: {:.3} sec",
            report.elapsed.as_secs_f64()
        );
    }
}
