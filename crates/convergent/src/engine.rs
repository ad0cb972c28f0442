//! The convergence engine.
//!
//! Walks the resource collection strictly sequentially, driving each
//! resource through `pending -> guard-check -> {skipped | load-current-state
//! -> diff/act -> converged} -> notifications -> done`. System mutations are
//! frequently non-commutative, so nothing here is parallel: one resource at
//! a time, in collection order, delayed notifications once at the end.
//!
//! Failure policy: a provider error (inspection or mutation) aborts the rest
//! of the run unless the resource declares `ignore_failure`; either way it
//! lands in the report, and the report accumulated so far always survives
//! an abort. There is no automatic retry - an already-partially-applied
//! mutation is only safe to retry through diff/act on the next run.

use crate::collection::ResourceCollection;
use crate::context::{GuardEvaluator, RunContext};
use crate::error::ConvergeError;
use crate::provider::{PlatformInfo, ProviderRegistry};
use crate::report::Outcome;
use crate::resource::{NotifyTiming, Resource};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Options for one convergence run.
#[derive(Debug, Clone, Default)]
pub struct ConvergeOptions {
    /// Overall run deadline, checked between resource applications. A
    /// blocking provider call is not preempted; expiry aborts the remaining
    /// resources with [`ConvergeError::Timeout`].
    pub timeout: Option<Duration>,
}

/// The convergence engine for one run.
///
/// Owns nothing: the provider registry and guard evaluator are borrowed for
/// the run, the collection and context are passed through explicitly.
pub struct Engine<'a> {
    registry: &'a ProviderRegistry,
    guards: &'a dyn GuardEvaluator,
    options: ConvergeOptions,
}

/// Per-run bookkeeping threaded through the walk.
struct RunState {
    platform: PlatformInfo,
    started: Instant,
    /// Deferred notifications as (target position, action), deduplicated on
    /// push and again against the executed set when flushed
    delayed: Vec<(usize, String)>,
}

impl<'a> Engine<'a> {
    /// Create an engine with default options.
    pub fn new(registry: &'a ProviderRegistry, guards: &'a dyn GuardEvaluator) -> Self {
        Self {
            registry,
            guards,
            options: ConvergeOptions::default(),
        }
    }

    /// Replace the options (builder style).
    pub fn with_options(mut self, options: ConvergeOptions) -> Self {
        self.options = options;
        self
    }

    /// Converge the collection against the live system.
    ///
    /// On error the context's report still holds every entry recorded up to
    /// the abort; unreached resources are simply absent from it.
    pub fn converge(
        &self,
        collection: &mut ResourceCollection,
        ctx: &mut RunContext,
    ) -> Result<(), ConvergeError> {
        let mut state = RunState {
            platform: PlatformInfo::from_node(&ctx.node),
            started: Instant::now(),
            delayed: Vec::new(),
        };

        info!(
            "converging {} resources on node '{}'",
            collection.len(),
            ctx.node.name
        );

        for idx in 0..collection.len() {
            let action = collection.get(idx).primary_action().to_string();
            self.apply(idx, &action, collection, ctx, &mut state)?;
        }

        self.flush_delayed(collection, ctx, &mut state)?;

        let summary = ctx.report.summary();
        info!(
            "run complete: {} updated, {} up to date, {} skipped, {} failed",
            summary.updated, summary.up_to_date, summary.skipped, summary.failed
        );
        Ok(())
    }

    /// Apply one action to the resource at `idx`, recording the outcome.
    fn apply(
        &self,
        idx: usize,
        action: &str,
        collection: &mut ResourceCollection,
        ctx: &mut RunContext,
        state: &mut RunState,
    ) -> Result<(), ConvergeError> {
        self.check_deadline(state)?;

        let id = collection.get(idx).id.to_string();

        // guard-check
        match self.check_guards(collection.get(idx)) {
            Ok(None) => {}
            Ok(Some(reason)) => {
                debug!("{id} skipped ({reason} guard)");
                ctx.report.record(
                    id,
                    action.to_string(),
                    Outcome::Skipped {
                        reason: format!("{reason} guard"),
                    },
                );
                return Ok(());
            }
            Err(source) => {
                let err = ConvergeError::Guard {
                    resource: id.clone(),
                    source,
                };
                return self.fail(idx, &id, action, err, collection, ctx);
            }
        }

        // provider resolution
        let type_tag = collection.get(idx).id.type_tag.clone();
        let Some(provider) = self.registry.resolve(&type_tag, &state.platform) else {
            let err = ConvergeError::NoProvider {
                resource: id.clone(),
                platform: state.platform.platform.clone(),
            };
            return self.fail(idx, &id, action, err, collection, ctx);
        };

        // loading-current-state, then diff/act
        let result = provider
            .load_current_state(&ctx.node, collection.get(idx))
            .and_then(|current| {
                provider.converge(&mut ctx.node, collection.get(idx), action, &current)
            });

        match result {
            Ok(true) => {
                info!("{id} ({action}) updated");
                collection.get_mut(idx).updated = true;
                ctx.report.record(id, action.to_string(), Outcome::Updated);
                self.fire_notifications(idx, collection, ctx, state)
            }
            Ok(false) => {
                debug!("{id} ({action}) already up to date");
                ctx.report.record(id, action.to_string(), Outcome::UpToDate);
                Ok(())
            }
            Err(source) => {
                let err = ConvergeError::Provider {
                    resource: id.clone(),
                    action: action.to_string(),
                    source,
                };
                self.fail(idx, &id, action, err, collection, ctx)
            }
        }
    }

    /// Record a resource failure, then either tolerate it or abort the run.
    fn fail(
        &self,
        idx: usize,
        id: &str,
        action: &str,
        err: ConvergeError,
        collection: &ResourceCollection,
        ctx: &mut RunContext,
    ) -> Result<(), ConvergeError> {
        ctx.report.record(
            id.to_string(),
            action.to_string(),
            Outcome::Failed {
                error: err.to_string(),
            },
        );
        if err.is_resource_scoped() && collection.get(idx).ignore_failure {
            warn!("{id} failed but declares ignore_failure, continuing: {err}");
            Ok(())
        } else {
            Err(err)
        }
    }

    /// `not_if` first, then `only_if`. Returns the suppressing guard's name,
    /// or `None` to proceed. An evaluation error propagates untouched.
    fn check_guards(&self, resource: &Resource) -> anyhow::Result<Option<&'static str>> {
        if let Some(test) = &resource.not_if
            && self.guards.eval(test)?
        {
            return Ok(Some("not_if"));
        }
        if let Some(test) = &resource.only_if
            && !self.guards.eval(test)?
        {
            return Ok(Some("only_if"));
        }
        Ok(None)
    }

    /// Fire the updated resource's edges: immediate targets run now, out of
    /// normal sequence; delayed targets are queued exactly once.
    fn fire_notifications(
        &self,
        idx: usize,
        collection: &mut ResourceCollection,
        ctx: &mut RunContext,
        state: &mut RunState,
    ) -> Result<(), ConvergeError> {
        let edges = collection.get(idx).notifications.clone();
        for edge in edges {
            // Compilation verified every target; a miss here is a bug.
            let Some(target_idx) = collection.position(&edge.target) else {
                continue;
            };
            match edge.timing {
                NotifyTiming::Immediate => {
                    info!(
                        "{} notifies {} ({}) immediately",
                        collection.get(idx).id,
                        edge.target,
                        edge.action
                    );
                    self.apply(target_idx, &edge.action, collection, ctx, state)?;
                }
                NotifyTiming::Delayed => {
                    let key = (target_idx, edge.action.clone());
                    if !state.delayed.contains(&key) {
                        debug!("queueing delayed {} ({})", edge.target, edge.action);
                        state.delayed.push(key);
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the deferred notifications once, in declaration order. Targets
    /// updated here may queue further delayed work; keep draining until the
    /// queue is quiet.
    fn flush_delayed(
        &self,
        collection: &mut ResourceCollection,
        ctx: &mut RunContext,
        state: &mut RunState,
    ) -> Result<(), ConvergeError> {
        let mut executed: HashSet<(usize, String)> = HashSet::new();
        loop {
            let mut batch: Vec<(usize, String)> = state
                .delayed
                .drain(..)
                .filter(|key| !executed.contains(key))
                .collect();
            if batch.is_empty() {
                return Ok(());
            }
            batch.sort();
            for (idx, action) in batch {
                executed.insert((idx, action.clone()));
                self.apply(idx, &action, collection, ctx, state)?;
            }
        }
    }

    fn check_deadline(&self, state: &RunState) -> Result<(), ConvergeError> {
        if let Some(limit) = self.options.timeout {
            let elapsed = state.started.elapsed();
            if elapsed >= limit {
                return Err(ConvergeError::Timeout {
                    elapsed_secs: elapsed.as_secs(),
                    limit_secs: limit.as_secs(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Node;
    use crate::provider::{CurrentState, PlatformRule, Provider};
    use crate::report::Outcome;
    use crate::resource::{GuardTest, ResourceId};
    use anyhow::bail;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Provider driven by resource params: `in_sync` controls diff/act,
    /// `fail`/`fail_load` force errors. Every call is logged.
    #[derive(Debug)]
    struct ScriptedProvider {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedProvider {
        fn push(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
    }

    impl Provider for ScriptedProvider {
        fn load_current_state(&self, _: &Node, resource: &Resource) -> anyhow::Result<CurrentState> {
            if resource.params.get("fail_load") == Some(&json!(true)) {
                bail!("inspection failed");
            }
            self.push(format!("load {}", resource.id));
            let mut current = CurrentState::new();
            current.insert(
                "in_sync".to_string(),
                resource.params.get("in_sync").cloned().unwrap_or(json!(false)),
            );
            Ok(current)
        }

        fn converge(
            &self,
            _: &mut Node,
            resource: &Resource,
            action: &str,
            current: &CurrentState,
        ) -> anyhow::Result<bool> {
            if resource.params.get("fail") == Some(&json!(true)) {
                bail!("mutation failed");
            }
            let non_idempotent = action == "restart" || action == "run";
            let in_sync = current.get("in_sync") == Some(&json!(true));
            if non_idempotent || !in_sync {
                self.push(format!("act {} {}", resource.id, action));
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    /// Guard stub: the command string is "true", "false", or unevaluable.
    struct LiteralGuards;

    impl GuardEvaluator for LiteralGuards {
        fn eval(&self, test: &GuardTest) -> anyhow::Result<bool> {
            let GuardTest::Command(cmd) = test;
            match cmd.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => bail!("cannot evaluate '{other}'"),
            }
        }
    }

    struct Fixture {
        registry: ProviderRegistry,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let log: Arc<Mutex<Vec<String>>> = Arc::default();
            let mut registry = ProviderRegistry::new();
            let provider_log = Arc::clone(&log);
            registry.register("test", PlatformRule::Any, move || {
                Box::new(ScriptedProvider {
                    log: Arc::clone(&provider_log),
                })
            });
            Self { registry, log }
        }

        fn converge(
            &self,
            resources: Vec<Resource>,
        ) -> (Result<(), ConvergeError>, RunContext) {
            self.converge_with(resources, ConvergeOptions::default())
        }

        fn converge_with(
            &self,
            resources: Vec<Resource>,
            options: ConvergeOptions,
        ) -> (Result<(), ConvergeError>, RunContext) {
            let mut collection = ResourceCollection::new();
            for resource in resources {
                collection.append(resource).unwrap();
            }
            let mut ctx = RunContext::new(Node::new("test-node"), Default::default());
            let engine = Engine::new(&self.registry, &LiteralGuards).with_options(options);
            let result = engine.converge(&mut collection, &mut ctx);
            (result, ctx)
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    fn out_of_sync(name: &str, action: &str) -> Resource {
        Resource::new("test", name, action).with_param("in_sync", json!(false))
    }

    #[test]
    fn in_sync_resource_performs_no_mutation() {
        let fixture = Fixture::new();
        let (result, ctx) = fixture.converge(vec![
            Resource::new("test", "a", "create").with_param("in_sync", json!(true)),
        ]);

        result.unwrap();
        assert_eq!(fixture.log(), vec!["load test[a]"]);
        assert_eq!(ctx.report.entries[0].outcome, Outcome::UpToDate);
        assert!(!ctx.report.entries[0].updated);
    }

    #[test]
    fn drifted_resource_is_converged_once() {
        let fixture = Fixture::new();
        let (result, ctx) = fixture.converge(vec![out_of_sync("a", "create")]);

        result.unwrap();
        assert_eq!(fixture.log(), vec!["load test[a]", "act test[a] create"]);
        assert_eq!(ctx.report.updated_resources(), vec!["test[a]"]);
    }

    #[test]
    fn not_if_guard_skips_without_touching_the_provider() {
        let fixture = Fixture::new();
        let (result, ctx) = fixture.converge(vec![
            out_of_sync("guarded", "create").not_if(GuardTest::Command("true".into())),
        ]);

        result.unwrap();
        assert!(fixture.log().is_empty(), "provider never invoked");
        assert_eq!(
            ctx.report.entries[0].outcome,
            Outcome::Skipped {
                reason: "not_if guard".into()
            }
        );
    }

    #[test]
    fn only_if_false_skips() {
        let fixture = Fixture::new();
        let (result, ctx) = fixture.converge(vec![
            out_of_sync("guarded", "create").only_if(GuardTest::Command("false".into())),
        ]);

        result.unwrap();
        assert!(fixture.log().is_empty());
        assert!(matches!(ctx.report.entries[0].outcome, Outcome::Skipped { .. }));
    }

    #[test]
    fn guard_evaluation_error_is_fatal_not_a_skip() {
        let fixture = Fixture::new();
        let (result, ctx) = fixture.converge(vec![
            out_of_sync("broken", "create").only_if(GuardTest::Command("explode".into())),
        ]);

        assert!(matches!(result, Err(ConvergeError::Guard { .. })));
        assert!(matches!(ctx.report.entries[0].outcome, Outcome::Failed { .. }));
    }

    #[test]
    fn immediate_notification_runs_target_before_next_resource() {
        let fixture = Fixture::new();
        let r1 = out_of_sync("one", "create").notifies(
            NotifyTiming::Immediate,
            ResourceId::new("test", "two"),
            "restart",
        );
        let r2 = Resource::new("test", "two", "start").with_param("in_sync", json!(true));
        let r3 = out_of_sync("three", "create");

        let (result, _) = fixture.converge(vec![r1, r2, r3]);
        result.unwrap();

        assert_eq!(
            fixture.log(),
            vec![
                // notified restart of "two" runs immediately after "one",
                // before the walk reaches "two" or "three"
                "load test[one]",
                "act test[one] create",
                "load test[two]",
                "act test[two] restart",
                // then the walk continues in declaration order; "two" is in
                // sync for its own primary action
                "load test[two]",
                "load test[three]",
                "act test[three] create",
            ]
        );
    }

    #[test]
    fn delayed_notifications_dedup_and_run_last() {
        let fixture = Fixture::new();
        let service = ResourceId::new("test", "svc");
        let r1 = out_of_sync("one", "create").notifies(
            NotifyTiming::Delayed,
            service.clone(),
            "restart",
        );
        let r2 = out_of_sync("two", "create").notifies(
            NotifyTiming::Delayed,
            service.clone(),
            "restart",
        );
        let svc = Resource::new("test", "svc", "start").with_param("in_sync", json!(true));
        let r3 = out_of_sync("three", "create");

        let (result, ctx) = fixture.converge(vec![r1, r2, svc, r3]);
        result.unwrap();

        let log = fixture.log();
        let restarts = log.iter().filter(|l| l.contains("restart")).count();
        assert_eq!(restarts, 1, "target restarted exactly once");

        // The restart is the very last provider action of the run.
        assert_eq!(log.last().unwrap(), "act test[svc] restart");
        let last = ctx.report.entries.last().unwrap();
        assert_eq!(last.resource, "test[svc]");
        assert_eq!(last.action, "restart");
    }

    #[test]
    fn backward_notification_reexecutes_an_earlier_resource() {
        let fixture = Fixture::new();
        let first = Resource::new("test", "first", "start").with_param("in_sync", json!(true));
        let later = out_of_sync("later", "create").notifies(
            NotifyTiming::Delayed,
            ResourceId::new("test", "first"),
            "restart",
        );

        let (result, _) = fixture.converge(vec![first, later]);
        result.unwrap();
        assert!(fixture.log().contains(&"act test[first] restart".to_string()));
    }

    #[test]
    fn notified_target_guards_are_reevaluated() {
        let fixture = Fixture::new();
        let target = Resource::new("test", "svc", "start")
            .with_param("in_sync", json!(true))
            .not_if(GuardTest::Command("true".into()));
        let notifier = out_of_sync("conf", "create").notifies(
            NotifyTiming::Delayed,
            ResourceId::new("test", "svc"),
            "restart",
        );

        let (result, ctx) = fixture.converge(vec![target, notifier]);
        result.unwrap();
        assert!(!fixture.log().iter().any(|l| l.contains("restart")));
        // Two skip entries for svc: its primary pass and the notified run.
        let svc_skips = ctx
            .report
            .entries
            .iter()
            .filter(|e| e.resource == "test[svc]")
            .filter(|e| matches!(e.outcome, Outcome::Skipped { .. }))
            .count();
        assert_eq!(svc_skips, 2);
    }

    #[test]
    fn provider_failure_aborts_but_keeps_partial_report() {
        let fixture = Fixture::new();
        let (result, ctx) = fixture.converge(vec![
            out_of_sync("ok", "create"),
            out_of_sync("boom", "create").with_param("fail", json!(true)),
            out_of_sync("unreached", "create"),
        ]);

        assert!(matches!(result, Err(ConvergeError::Provider { .. })));
        let names: Vec<&str> = ctx.report.entries.iter().map(|e| e.resource.as_str()).collect();
        assert_eq!(names, vec!["test[ok]", "test[boom]"]);
        assert_eq!(ctx.report.updated_resources(), vec!["test[ok]"]);
    }

    #[test]
    fn inspection_failure_is_a_resource_error() {
        let fixture = Fixture::new();
        let (result, _) = fixture.converge(vec![
            out_of_sync("blind", "create").with_param("fail_load", json!(true)),
        ]);
        assert!(matches!(result, Err(ConvergeError::Provider { .. })));
    }

    #[test]
    fn ignore_failure_records_the_error_and_continues() {
        let fixture = Fixture::new();
        let (result, ctx) = fixture.converge(vec![
            out_of_sync("boom", "create")
                .with_param("fail", json!(true))
                .ignore_failure(),
            out_of_sync("after", "create"),
        ]);

        result.unwrap();
        assert!(matches!(ctx.report.entries[0].outcome, Outcome::Failed { .. }));
        assert_eq!(ctx.report.updated_resources(), vec!["test[after]"]);
    }

    #[test]
    fn unresolvable_provider_is_fatal_for_the_resource() {
        let fixture = Fixture::new();
        let (result, _) = fixture.converge(vec![Resource::new("cron", "tick", "create")]);
        assert!(matches!(result, Err(ConvergeError::NoProvider { .. })));
    }

    #[test]
    fn expired_deadline_aborts_the_run() {
        let fixture = Fixture::new();
        let (result, ctx) = fixture.converge_with(
            vec![out_of_sync("late", "create")],
            ConvergeOptions {
                timeout: Some(Duration::ZERO),
            },
        );

        assert!(matches!(result, Err(ConvergeError::Timeout { .. })));
        assert!(ctx.report.entries.is_empty());
    }
}
