//! Sync engine and options.

use super::MemberDiff;
use crate::adapters::Adapter;
use crate::context::SyncContext;
use crate::models::{ExternalKey, join_keys};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{Span, instrument};

/// Which mutation runs first when both are needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOrder {
    /// Add before removing, so a group is never transiently empty.
    #[default]
    AddFirst,
    /// Remove before adding, for targets with strict capacity limits.
    RemoveFirst,
}

/// Which halves of the diff the engine applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Apply additions and removals.
    #[default]
    AddAndRemove,
    /// Only add missing members.
    AddOnly,
    /// Only remove extra members.
    RemoveOnly,
}

/// Engine configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Mutation order.
    pub order: OperationOrder,
    /// Which halves of the diff to apply.
    pub operating_mode: OperatingMode,
    /// Report the diff without mutating the target.
    pub dry_run: bool,
    /// Refuse runs with more changes than this. Zero means unlimited.
    pub maximum_changes: usize,
    /// Fetch source and target on separate threads.
    pub concurrent_fetch: bool,
}

impl SyncOptions {
    /// Sets the mutation order.
    #[must_use]
    pub const fn with_order(mut self, order: OperationOrder) -> Self {
        self.order = order;
        self
    }

    /// Sets the operating mode.
    #[must_use]
    pub const fn with_operating_mode(mut self, mode: OperatingMode) -> Self {
        self.operating_mode = mode;
        self
    }

    /// Enables or disables dry runs.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the change limit. Zero disables it.
    #[must_use]
    pub const fn with_maximum_changes(mut self, maximum_changes: usize) -> Self {
        self.maximum_changes = maximum_changes;
        self
    }

    /// Enables or disables concurrent fetching.
    #[must_use]
    pub const fn with_concurrent_fetch(mut self, concurrent_fetch: bool) -> Self {
        self.concurrent_fetch = concurrent_fetch;
        self
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Run id of the context the sync ran under.
    pub run_id: String,
    /// Keys added to the target, or that would be in a dry run.
    pub added: Vec<ExternalKey>,
    /// Keys removed from the target, or that would be in a dry run.
    pub removed: Vec<ExternalKey>,
    /// Whether the target was left untouched.
    pub dry_run: bool,
}

impl SyncReport {
    /// Returns `true` if the sides already agreed.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Step {
    Add,
    Remove,
}

impl Step {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

/// Converges a target adapter onto a source of truth.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    options: SyncOptions,
}

impl SyncEngine {
    /// Creates an engine with the given options.
    #[must_use]
    pub const fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    /// Returns the engine options.
    #[must_use]
    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Syncs `target` to the members of `source`.
    ///
    /// Both sides are fetched before anything is diffed; a failed fetch
    /// aborts the run before any mutation.
    ///
    /// # Errors
    ///
    /// Returns the first failing adapter call, `Error::TooManyChanges` if the
    /// change limit is exceeded, or `Error::Cancelled`.
    #[instrument(
        skip_all,
        fields(
            run_id = %ctx.run_id(),
            source = %source.kind(),
            target = %target.kind(),
            dry_run = self.options.dry_run
        )
    )]
    pub fn sync_with<S, T>(&self, ctx: &SyncContext, source: &mut S, target: &mut T) -> Result<SyncReport>
    where
        S: Adapter + ?Sized,
        T: Adapter + ?Sized,
    {
        let start = Instant::now();
        let result = self
            .fetch_both(ctx, source, target)
            .and_then(|(desired, current)| self.converge(ctx, &desired, &current, target));
        record_run(&result, start);
        result
    }

    /// Syncs `target` to an explicit desired member list.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::sync_with`].
    #[instrument(
        skip_all,
        fields(
            run_id = %ctx.run_id(),
            target = %target.kind(),
            desired = desired.len(),
            dry_run = self.options.dry_run
        )
    )]
    pub fn sync<T>(&self, ctx: &SyncContext, desired: &[ExternalKey], target: &mut T) -> Result<SyncReport>
    where
        T: Adapter + ?Sized,
    {
        let start = Instant::now();
        let result = target
            .get(ctx)
            .and_then(|current| self.converge(ctx, desired, &current, target));
        record_run(&result, start);
        result
    }

    fn fetch_both<S, T>(
        &self,
        ctx: &SyncContext,
        source: &mut S,
        target: &mut T,
    ) -> Result<(Vec<ExternalKey>, Vec<ExternalKey>)>
    where
        S: Adapter + ?Sized,
        T: Adapter + ?Sized,
    {
        if !self.options.concurrent_fetch {
            let desired = source.get(ctx)?;
            let current = target.get(ctx)?;
            return Ok((desired, current));
        }

        let span = Span::current();
        std::thread::scope(|scope| {
            let source_span = span.clone();
            let handle = scope.spawn(move || source_span.in_scope(|| source.get(ctx)));
            let current = span.in_scope(|| target.get(ctx));
            let desired = handle.join().map_err(|_| Error::OperationFailed {
                operation: "fetch source members".to_string(),
                cause: "fetch thread panicked".to_string(),
            })?;
            Ok((desired?, current?))
        })
    }

    fn converge<T>(
        &self,
        ctx: &SyncContext,
        desired: &[ExternalKey],
        current: &[ExternalKey],
        target: &mut T,
    ) -> Result<SyncReport>
    where
        T: Adapter + ?Sized,
    {
        let diff = MemberDiff::compute(desired, current).restrict(self.options.operating_mode);

        tracing::info!(
            to_add = diff.to_add.len(),
            to_remove = diff.to_remove.len(),
            "Computed membership diff"
        );

        if self.options.maximum_changes > 0 && diff.changes() > self.options.maximum_changes {
            return Err(Error::TooManyChanges {
                changes: diff.changes(),
                limit: self.options.maximum_changes,
            });
        }

        if self.options.dry_run {
            tracing::info!(
                add = %join_keys(&diff.to_add),
                remove = %join_keys(&diff.to_remove),
                "Dry run, target left unchanged"
            );
        } else {
            let steps = match self.options.order {
                OperationOrder::AddFirst => [Step::Add, Step::Remove],
                OperationOrder::RemoveFirst => [Step::Remove, Step::Add],
            };
            for step in steps {
                apply(ctx, step, &diff, target)?;
            }
        }

        Ok(SyncReport {
            run_id: ctx.run_id().to_string(),
            added: diff.to_add,
            removed: diff.to_remove,
            dry_run: self.options.dry_run,
        })
    }
}

fn apply<T>(ctx: &SyncContext, step: Step, diff: &MemberDiff, target: &mut T) -> Result<()>
where
    T: Adapter + ?Sized,
{
    let keys = match step {
        Step::Add => &diff.to_add,
        Step::Remove => &diff.to_remove,
    };
    if keys.is_empty() {
        return Ok(());
    }

    ctx.check()?;
    match step {
        Step::Add => target.add(ctx, keys)?,
        Step::Remove => target.remove(ctx, keys)?,
    }

    metrics::counter!(
        "groupsync_changes_total",
        "operation" => step.as_str(),
        "adapter" => target.kind().as_str()
    )
    .increment(keys.len() as u64);
    tracing::info!(operation = step.as_str(), members = %join_keys(keys), "Applied changes");
    Ok(())
}

fn record_run(result: &Result<SyncReport>, start: Instant) {
    let status = match result {
        Ok(_) => "success",
        Err(e) if e.is_cancelled() => "cancelled",
        Err(_) => "error",
    };
    metrics::counter!("groupsync_sync_total", "status" => status).increment(1);
    metrics::histogram!("groupsync_sync_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);

    if let Err(e) = result {
        tracing::warn!(error = %e, "Sync failed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::AdapterKind;
    use crate::adapters::BackendError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Get,
        Add(Vec<String>),
        Remove(Vec<String>),
    }

    /// In-memory adapter that records every call.
    #[derive(Default)]
    struct Recording {
        members: Vec<ExternalKey>,
        calls: Vec<Call>,
        fail_get: bool,
        fail_add: bool,
    }

    impl Recording {
        fn with_members(values: &[&str]) -> Self {
            Self {
                members: keys(values),
                ..Self::default()
            }
        }

        fn mutations(&self) -> Vec<Call> {
            self.calls
                .iter()
                .filter(|c| !matches!(c, Call::Get))
                .cloned()
                .collect()
        }
    }

    fn failure(operation: &'static str) -> Error {
        Error::Backend {
            adapter: "slack_user_group",
            operation,
            subject: "test".to_string(),
            source: BackendError::Api {
                code: "fatal_error".to_string(),
            },
        }
    }

    impl Adapter for Recording {
        fn kind(&self) -> AdapterKind {
            AdapterKind::SlackUserGroup
        }

        fn get(&mut self, _ctx: &SyncContext) -> Result<Vec<ExternalKey>> {
            self.calls.push(Call::Get);
            if self.fail_get {
                return Err(failure("get"));
            }
            Ok(self.members.clone())
        }

        fn add(&mut self, _ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()> {
            self.calls
                .push(Call::Add(keys.iter().map(ToString::to_string).collect()));
            if self.fail_add {
                return Err(failure("add"));
            }
            self.members.extend(keys.iter().cloned());
            Ok(())
        }

        fn remove(&mut self, _ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()> {
            self.calls
                .push(Call::Remove(keys.iter().map(ToString::to_string).collect()));
            self.members.retain(|m| !keys.contains(m));
            Ok(())
        }
    }

    fn keys(values: &[&str]) -> Vec<ExternalKey> {
        values.iter().map(|v| ExternalKey::from(*v)).collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_sync_with_adds_then_removes() {
        let mut source = Recording::with_members(&["a@x", "b@x"]);
        let mut target = Recording::with_members(&["b@x", "c@x"]);
        let ctx = SyncContext::from_id("run-1");

        let report = SyncEngine::default()
            .sync_with(&ctx, &mut source, &mut target)
            .unwrap();

        assert_eq!(report.run_id, "run-1");
        assert_eq!(report.added, keys(&["a@x"]));
        assert_eq!(report.removed, keys(&["c@x"]));
        assert_eq!(
            target.mutations(),
            vec![Call::Add(strings(&["a@x"])), Call::Remove(strings(&["c@x"]))]
        );
        assert_eq!(source.calls, vec![Call::Get]);
    }

    #[test]
    fn test_second_run_makes_no_mutations() {
        let mut source = Recording::with_members(&["a@x", "b@x"]);
        let mut target = Recording::with_members(&["b@x", "c@x"]);
        let engine = SyncEngine::default();
        let ctx = SyncContext::new();

        assert!(engine.sync_with(&ctx, &mut source, &mut target).is_ok());
        target.calls.clear();
        let report = engine.sync_with(&ctx, &mut source, &mut target);

        assert!(report.is_ok_and(|r| r.is_noop()));
        assert!(target.mutations().is_empty());
    }

    #[test]
    fn test_remove_first_order() {
        let mut target = Recording::with_members(&["c@x"]);
        let engine = SyncEngine::new(SyncOptions::default().with_order(OperationOrder::RemoveFirst));

        let result = engine.sync(&SyncContext::new(), &keys(&["a@x"]), &mut target);

        assert!(result.is_ok());
        assert_eq!(
            target.mutations(),
            vec![Call::Remove(strings(&["c@x"])), Call::Add(strings(&["a@x"]))]
        );
    }

    #[test]
    fn test_operating_modes() {
        let mut target = Recording::with_members(&["c@x"]);
        let engine = SyncEngine::new(SyncOptions::default().with_operating_mode(OperatingMode::AddOnly));
        let report = engine
            .sync(&SyncContext::new(), &keys(&["a@x"]), &mut target)
            .unwrap();
        assert_eq!(report.added, keys(&["a@x"]));
        assert!(report.removed.is_empty());
        assert_eq!(target.mutations(), vec![Call::Add(strings(&["a@x"]))]);

        let mut target = Recording::with_members(&["c@x"]);
        let engine =
            SyncEngine::new(SyncOptions::default().with_operating_mode(OperatingMode::RemoveOnly));
        let report = engine
            .sync(&SyncContext::new(), &keys(&["a@x"]), &mut target)
            .unwrap();
        assert!(report.added.is_empty());
        assert_eq!(target.mutations(), vec![Call::Remove(strings(&["c@x"]))]);
    }

    #[test]
    fn test_dry_run_reports_without_mutating() {
        let mut target = Recording::with_members(&["c@x"]);
        let engine = SyncEngine::new(SyncOptions::default().with_dry_run(true));

        let report = engine
            .sync(&SyncContext::new(), &keys(&["a@x"]), &mut target)
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.added, keys(&["a@x"]));
        assert_eq!(report.removed, keys(&["c@x"]));
        assert_eq!(target.calls, vec![Call::Get]);
    }

    #[test]
    fn test_maximum_changes() {
        let mut target = Recording::with_members(&["c@x", "d@x"]);
        let engine = SyncEngine::new(SyncOptions::default().with_maximum_changes(2));

        let err = engine
            .sync(&SyncContext::new(), &keys(&["a@x"]), &mut target)
            .err();

        assert!(matches!(
            err,
            Some(Error::TooManyChanges {
                changes: 3,
                limit: 2
            })
        ));
        assert!(target.mutations().is_empty());

        let engine = SyncEngine::new(
            SyncOptions::default()
                .with_maximum_changes(2)
                .with_operating_mode(OperatingMode::RemoveOnly),
        );
        assert!(engine.sync(&SyncContext::new(), &keys(&["a@x"]), &mut target).is_ok());
    }

    #[test]
    fn test_get_failure_aborts_before_mutation() {
        let mut source = Recording::with_members(&["a@x"]);
        source.fail_get = true;
        let mut target = Recording::with_members(&["c@x"]);

        let result = SyncEngine::default().sync_with(&SyncContext::new(), &mut source, &mut target);

        assert!(result.is_err());
        assert!(target.mutations().is_empty());
    }

    #[test]
    fn test_add_failure_skips_remove() {
        let mut target = Recording::with_members(&["c@x"]);
        target.fail_add = true;

        let err = SyncEngine::default()
            .sync(&SyncContext::new(), &keys(&["a@x"]), &mut target)
            .err();

        assert!(matches!(err, Some(Error::Backend { operation: "add", .. })));
        assert_eq!(target.mutations(), vec![Call::Add(strings(&["a@x"]))]);
    }

    #[test]
    fn test_cancelled_context_stops_before_mutation() {
        let mut target = Recording::with_members(&["c@x"]);
        let ctx = SyncContext::new();
        ctx.cancel_handle().cancel();

        let err = SyncEngine::default().sync(&ctx, &keys(&["a@x"]), &mut target).err();

        assert!(err.is_some_and(|e| e.is_cancelled()));
        assert!(target.mutations().is_empty());
    }

    #[test]
    fn test_concurrent_fetch_matches_sequential() {
        let mut source = Recording::with_members(&["a@x", "b@x"]);
        let mut target = Recording::with_members(&["b@x", "c@x"]);
        let engine = SyncEngine::new(SyncOptions::default().with_concurrent_fetch(true));

        let report = engine
            .sync_with(&SyncContext::new(), &mut source, &mut target)
            .unwrap();

        assert_eq!(report.added, keys(&["a@x"]));
        assert_eq!(report.removed, keys(&["c@x"]));
        assert_eq!(source.calls, vec![Call::Get]);
    }

    #[test]
    fn test_concurrent_fetch_reports_source_failure() {
        let mut source = Recording::default();
        source.fail_get = true;
        let mut target = Recording::with_members(&["c@x"]);
        let engine = SyncEngine::new(SyncOptions::default().with_concurrent_fetch(true));

        let err = engine
            .sync_with(&SyncContext::new(), &mut source, &mut target)
            .err();

        assert!(matches!(err, Some(Error::Backend { operation: "get", .. })));
        assert!(target.mutations().is_empty());
    }

    #[test]
    fn test_boxed_adapters() {
        let mut source: Box<dyn Adapter> = Box::new(Recording::with_members(&["a@x"]));
        let mut target: Box<dyn Adapter> = Box::new(Recording::default());

        let report = SyncEngine::default()
            .sync_with(&SyncContext::new(), source.as_mut(), target.as_mut())
            .unwrap();

        assert_eq!(report.added, keys(&["a@x"]));
    }

    #[test]
    fn test_report_serializes() {
        let report = SyncReport {
            run_id: "run-1".to_string(),
            added: keys(&["a@x"]),
            removed: Vec::new(),
            dry_run: true,
        };

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["added"][0], "a@x");
        assert_eq!(json["dry_run"], true);
    }
}
