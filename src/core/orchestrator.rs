// src/core/orchestrator.rs

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::core::aggregator::assemble_report;
use crate::core::error::{AnalyzeError, ProbeError};
use crate::core::models::{AnalyzeRequest, ProbeResult, Report, Target};
use crate::core::probes::Probe;

/// Score charged when a probe runs past its own timeout.
pub const TIMEOUT_PENALTY: u32 = 30;
/// Score charged when the request deadline cuts a probe short.
pub const DEADLINE_PENALTY: u32 = 30;
/// Score charged when a probe panics.
pub const CRASH_PENALTY: u32 = 50;

struct RegisteredProbe {
    probe: Arc<dyn Probe>,
    timeout: Duration,
}

/// Runs the registered probe set concurrently for one target and merges the
/// results into a [`Report`].
///
/// Every probe runs in its own task under its own timeout, and the whole
/// request is bounded by `deadline`. A probe that panics, times out or is
/// still running at the deadline is recorded as a failed result; it never
/// takes its siblings or the request down with it.
pub struct Orchestrator {
    probes: Vec<RegisteredProbe>,
    deadline: Duration,
    score_cap: u32,
}

impl Orchestrator {
    pub fn new(deadline: Duration, score_cap: u32) -> Self {
        Self { probes: Vec::new(), deadline, score_cap }
    }

    /// Adds a probe. Registration order is report and warning order.
    pub fn register(mut self, probe: Arc<dyn Probe>, timeout: Duration) -> Self {
        self.probes.push(RegisteredProbe { probe, timeout });
        self
    }

    pub fn probe_names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.probe.name()).collect()
    }

    /// Validates the inbound request and analyzes it. Validation failures are
    /// returned before any probe is started.
    pub async fn analyze_request(&self, request: AnalyzeRequest) -> Result<Report, AnalyzeError> {
        let raw = request.url.unwrap_or_default();
        let target = Target::parse(&raw)?;
        Ok(self.analyze(&target).await)
    }

    /// Runs [`Orchestrator::analyze_request`] on its own task. A panic outside
    /// the probe tasks (aggregation, bookkeeping) becomes
    /// [`AnalyzeError::Internal`] instead of unwinding into the caller.
    pub async fn submit(self: Arc<Self>, request: AnalyzeRequest) -> Result<Report, AnalyzeError> {
        match tokio::spawn(async move { self.analyze_request(request).await }).await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let reason = describe_join_error(join_err);
                error!(error = %reason, "Analysis task failed.");
                Err(AnalyzeError::Internal(reason))
            }
        }
    }

    pub async fn analyze(&self, target: &Target) -> Report {
        info!(target = %target.url(), probes = self.probes.len(), "Starting analysis.");
        let started = Instant::now();
        let deadline = started + self.deadline;

        let handles: Vec<_> = self
            .probes
            .iter()
            .map(|entry| {
                let probe = Arc::clone(&entry.probe);
                let target = target.clone();
                let timeout = entry.timeout;
                tokio::spawn(async move {
                    let probe_started = Instant::now();
                    let run = AssertUnwindSafe(probe.run(&target)).catch_unwind();
                    let outcome = match tokio::time::timeout(timeout, run).await {
                        Ok(Ok(result)) => Ok(result),
                        Ok(Err(payload)) => Err(ProbeError::Crashed(panic_message(payload.as_ref()))),
                        Err(_) => Err(ProbeError::Timeout(timeout)),
                    };
                    (outcome, probe_started.elapsed())
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (entry, mut handle) in self.probes.iter().zip(handles) {
            let name = entry.probe.name();
            let mut result = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok((Ok(mut result), elapsed))) => {
                    result.duration = elapsed;
                    result
                }
                Ok(Ok((Err(err @ ProbeError::Crashed(_)), elapsed))) => {
                    error!(probe = name, error = %err, "Probe panicked.");
                    failure_result(name, &err, elapsed)
                }
                Ok(Ok((Err(err), elapsed))) => {
                    warn!(probe = name, error = %err, "Probe timed out.");
                    failure_result(name, &err, elapsed)
                }
                Ok(Err(join_err)) => {
                    let err = ProbeError::Crashed(describe_join_error(join_err));
                    error!(probe = name, error = %err, "Probe task failed.");
                    failure_result(name, &err, started.elapsed())
                }
                Err(_) => {
                    // Dropping the result channel is not enough: abort so the
                    // task stops doing network work for a finished request.
                    handle.abort();
                    let err = ProbeError::DeadlineExceeded;
                    error!(probe = name, "Request deadline exceeded, abandoning probe.");
                    failure_result(name, &err, started.elapsed())
                }
            };
            result.name = name.to_string();
            info!(
                probe = name,
                score = result.score_contribution,
                failed = result.failed,
                duration_ms = result.duration.as_millis() as u64,
                "Probe finished."
            );
            results.push(result);
        }

        let report = assemble_report(target.clone(), results, self.score_cap);
        info!(
            target = %target.url(),
            score = report.verdict().total_score,
            risk = %report.verdict().risk_level,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis finished."
        );
        report
    }
}

fn failure_result(name: &str, err: &ProbeError, elapsed: Duration) -> ProbeResult {
    let penalty = match err {
        ProbeError::Timeout(_) => TIMEOUT_PENALTY,
        ProbeError::DeadlineExceeded => DEADLINE_PENALTY,
        ProbeError::Crashed(_) => CRASH_PENALTY,
    };
    let mut result = ProbeResult::failure(name, format!("{name} probe {err}"), penalty);
    result.duration = elapsed;
    result
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => panic_message(payload.as_ref()),
        Err(err) => err.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::RiskLevel;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Succeed { score: u32, warnings: Vec<&'static str> },
        Sleep(Duration),
        Hang,
        Panic,
    }

    struct FakeProbe {
        name: &'static str,
        behaviour: Behaviour,
        runs: Arc<AtomicUsize>,
    }

    impl FakeProbe {
        fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self { name, behaviour, runs: Arc::new(AtomicUsize::new(0)) })
        }
    }

    #[async_trait]
    impl Probe for FakeProbe {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _target: &Target) -> ProbeResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Succeed { score, warnings } => {
                    let mut r = ProbeResult::new("whatever-the-probe-says");
                    for w in warnings {
                        r.flag(*w, 0);
                    }
                    r.score_contribution = *score;
                    r
                }
                Behaviour::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    ProbeResult::new(self.name)
                }
                Behaviour::Hang => std::future::pending().await,
                Behaviour::Panic => panic!("probe blew up"),
            }
        }
    }

    fn target() -> Target {
        Target::parse("https://example.com").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn runs_probes_concurrently() {
        let orchestrator = Orchestrator::new(Duration::from_secs(60), 100)
            .register(FakeProbe::new("a", Behaviour::Sleep(Duration::from_secs(3))), Duration::from_secs(10))
            .register(FakeProbe::new("b", Behaviour::Sleep(Duration::from_secs(3))), Duration::from_secs(10))
            .register(FakeProbe::new("c", Behaviour::Sleep(Duration::from_secs(3))), Duration::from_secs(10));

        let started = Instant::now();
        let report = orchestrator.analyze(&target()).await;
        let elapsed = started.elapsed();

        assert_eq!(report.probes().len(), 3);
        assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
        assert!(report.probes().iter().all(|p| !p.failed));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_fails_after_its_own_timeout() {
        let orchestrator = Orchestrator::new(Duration::from_secs(60), 100)
            .register(FakeProbe::new("quick", Behaviour::Sleep(Duration::from_secs(1))), Duration::from_secs(5))
            .register(FakeProbe::new("stuck", Behaviour::Hang), Duration::from_secs(5))
            .register(FakeProbe::new("steady", Behaviour::Sleep(Duration::from_secs(2))), Duration::from_secs(5));

        let started = Instant::now();
        let report = orchestrator.analyze(&target()).await;
        let elapsed = started.elapsed();

        // max of the timeouts, not their sum
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6), "took {elapsed:?}");

        let stuck = report.probe("stuck").unwrap();
        assert!(stuck.failed);
        assert_eq!(stuck.score_contribution, TIMEOUT_PENALTY);
        assert_eq!(stuck.warnings, vec!["stuck probe timed out after 5s".to_string()]);

        let quick = report.probe("quick").unwrap();
        assert!(!quick.failed);
        assert!(quick.duration < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_abandons_unfinished_probes() {
        let orchestrator = Orchestrator::new(Duration::from_secs(10), 100)
            .register(FakeProbe::new("fast", Behaviour::Sleep(Duration::from_secs(1))), Duration::from_secs(100))
            .register(FakeProbe::new("slow", Behaviour::Sleep(Duration::from_secs(50))), Duration::from_secs(100));

        let started = Instant::now();
        let report = orchestrator.analyze(&target()).await;

        assert!(started.elapsed() < Duration::from_secs(11));
        let slow = report.probe("slow").unwrap();
        assert!(slow.failed);
        assert_eq!(slow.score_contribution, DEADLINE_PENALTY);
        assert!(slow.warnings[0].contains("deadline"));
        assert!(!report.probe("fast").unwrap().failed);
    }

    #[tokio::test]
    async fn panicking_probe_is_isolated() {
        let orchestrator = Orchestrator::new(Duration::from_secs(5), 100)
            .register(FakeProbe::new("boom", Behaviour::Panic), Duration::from_secs(1))
            .register(
                FakeProbe::new("fine", Behaviour::Succeed { score: 5, warnings: vec!["minor"] }),
                Duration::from_secs(1),
            );

        let report = orchestrator.analyze(&target()).await;

        let boom = report.probe("boom").unwrap();
        assert!(boom.failed);
        assert_eq!(boom.score_contribution, CRASH_PENALTY);
        assert!(boom.warnings[0].contains("probe blew up"));

        let fine = report.probe("fine").unwrap();
        assert!(!fine.failed);
        assert_eq!(report.verdict().total_score, CRASH_PENALTY + 5);
        assert_eq!(report.verdict().risk_level, RiskLevel::High);
    }

    #[tokio::test(start_paused = true)]
    async fn crash_duration_is_the_probes_own_time() {
        let orchestrator = Orchestrator::new(Duration::from_secs(60), 100)
            .register(FakeProbe::new("slow", Behaviour::Sleep(Duration::from_secs(10))), Duration::from_secs(30))
            .register(FakeProbe::new("boom", Behaviour::Panic), Duration::from_secs(30));

        let report = orchestrator.analyze(&target()).await;

        let boom = report.probe("boom").unwrap();
        assert!(boom.failed);
        assert_eq!(boom.score_contribution, CRASH_PENALTY);
        assert!(boom.duration < Duration::from_secs(1), "took {:?}", boom.duration);
        assert!(report.probe("slow").unwrap().duration >= Duration::from_secs(10));
    }

    struct UnnamedProbe;

    #[async_trait]
    impl Probe for UnnamedProbe {
        fn name(&self) -> &'static str {
            panic!("name lookup failed")
        }

        async fn run(&self, _target: &Target) -> ProbeResult {
            ProbeResult::new("unnamed")
        }
    }

    #[tokio::test]
    async fn panic_outside_probe_tasks_is_an_internal_error() {
        let orchestrator =
            Arc::new(Orchestrator::new(Duration::from_secs(5), 100).register(Arc::new(UnnamedProbe), Duration::from_secs(1)));

        let err = orchestrator
            .submit(AnalyzeRequest { url: Some("https://example.com".into()) })
            .await
            .unwrap_err();

        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "internal error: name lookup failed");
    }

    #[tokio::test]
    async fn submit_returns_the_report() {
        let orchestrator = Arc::new(Orchestrator::new(Duration::from_secs(5), 100).register(
            FakeProbe::new("dns", Behaviour::Succeed { score: 7, warnings: vec!["No MX records found"] }),
            Duration::from_secs(1),
        ));

        let report = orchestrator.submit(AnalyzeRequest { url: Some("https://example.com".into()) }).await.unwrap();
        assert_eq!(report.verdict().total_score, 7);

        let rejecting = Orchestrator::new(Duration::from_secs(5), 100)
            .register(FakeProbe::new("dns", Behaviour::Hang), Duration::from_secs(1));
        let err = Arc::new(rejecting).submit(AnalyzeRequest { url: None }).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test(start_paused = true)]
    async fn one_result_per_probe_even_when_all_fail() {
        let orchestrator = Orchestrator::new(Duration::from_secs(3), 100)
            .register(FakeProbe::new("p1", Behaviour::Hang), Duration::from_secs(1))
            .register(FakeProbe::new("p2", Behaviour::Panic), Duration::from_secs(1))
            .register(FakeProbe::new("p3", Behaviour::Hang), Duration::from_secs(10))
            .register(FakeProbe::new("p4", Behaviour::Hang), Duration::from_secs(2));

        let report = orchestrator.analyze(&target()).await;

        let names: Vec<&str> = report.probes().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["p1", "p2", "p3", "p4"]);
        assert!(report.probes().iter().all(|p| p.failed && !p.warnings.is_empty()));
        assert_eq!(report.verdict().total_score, 100);
    }

    #[tokio::test]
    async fn result_name_follows_registration() {
        let orchestrator = Orchestrator::new(Duration::from_secs(5), 100).register(
            FakeProbe::new("dns", Behaviour::Succeed { score: 0, warnings: vec![] }),
            Duration::from_secs(1),
        );
        let report = orchestrator.analyze(&target()).await;
        assert_eq!(report.probes()[0].name, "dns");
    }

    #[tokio::test]
    async fn invalid_request_runs_no_probes() {
        let probe = FakeProbe::new("counted", Behaviour::Succeed { score: 0, warnings: vec![] });
        let runs = Arc::clone(&probe.runs);
        let orchestrator = Orchestrator::new(Duration::from_secs(5), 100).register(probe, Duration::from_secs(1));

        let err = orchestrator
            .analyze_request(AnalyzeRequest { url: Some("not a url".into()) })
            .await
            .unwrap_err();
        assert!(err.is_client_error());

        let err = orchestrator.analyze_request(AnalyzeRequest { url: None }).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn warning_order_is_stable_across_runs() {
        let orchestrator = Orchestrator::new(Duration::from_secs(5), 100)
            .register(
                FakeProbe::new("first", Behaviour::Succeed { score: 1, warnings: vec!["a", "b"] }),
                Duration::from_secs(1),
            )
            .register(
                FakeProbe::new("second", Behaviour::Succeed { score: 1, warnings: vec!["c"] }),
                Duration::from_secs(1),
            );

        let first = orchestrator.analyze(&target()).await;
        let second = orchestrator.analyze(&target()).await;
        assert_eq!(first.verdict().warnings, vec!["a", "b", "c"]);
        assert_eq!(first.verdict().warnings, second.verdict().warnings);
    }
}
