//! Message dispatch loop
//!
//! Consumes deliveries from the bus one at a time and routes them by topic:
//! - launches: decode a job request and, for the launch command, submit the
//!   job and publish Submitted or Failed
//! - stops: remove every cluster job of an invocation and publish Killed
//!
//! Each delivery is acknowledged before it is processed, so a failure while
//! handling it never causes redelivery. Failures are reported through status
//! updates; publishing is attempted once.

use anyhow::Result;
use condor_bus::{Delivery, JobConsumer, StatusPublisher, topics};
use condor_core::domain::job::JobDescription;
use condor_core::domain::status::{JobState, StatusUpdate};
use condor_core::dto::request::{Command, JobRequest, StopRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::service::Launcher;

/// Pause after a failed receive before trying again
const RECV_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Routes inbound deliveries to the launcher
pub struct Dispatcher {
    launcher: Arc<Launcher>,
    consumer: Arc<dyn JobConsumer>,
    publisher: Arc<dyn StatusPublisher>,
    default_request_disk: String,
}

impl Dispatcher {
    /// Creates a new dispatcher
    ///
    /// # Arguments
    /// * `launcher` - Launcher jobs are handed to
    /// * `consumer` - Source of inbound deliveries
    /// * `publisher` - Where status updates go
    /// * `default_request_disk` - Disk request for jobs that carry none
    pub fn new(
        launcher: Arc<Launcher>,
        consumer: Arc<dyn JobConsumer>,
        publisher: Arc<dyn StatusPublisher>,
        default_request_disk: impl Into<String>,
    ) -> Self {
        Self {
            launcher,
            consumer,
            publisher,
            default_request_disk: default_request_disk.into(),
        }
    }

    /// Handles deliveries until the consumer closes
    ///
    /// Receive errors other than a closed consumer are logged and the loop
    /// keeps going after a short pause.
    pub async fn run(&self) -> Result<()> {
        info!("Waiting for job requests");

        loop {
            match self.consumer.recv().await {
                Ok(Some(delivery)) => self.handle_delivery(delivery).await,
                Ok(None) => break,
                Err(e) if e.is_closed() => break,
                Err(e) => {
                    error!("Failed to receive delivery: {}", e);
                    tokio::time::sleep(RECV_RETRY_DELAY).await;
                }
            }
        }

        info!("Consumer closed, dispatch loop exiting");
        Ok(())
    }

    /// Acknowledges and processes a single delivery
    pub async fn handle_delivery(&self, delivery: Delivery) {
        if let Err(e) = self.consumer.ack(&delivery).await {
            warn!("Failed to acknowledge delivery {}: {}", delivery.tag, e);
        }

        match delivery.topic.as_str() {
            topics::LAUNCHES => self.handle_job_request(&delivery.body).await,
            topics::STOPS => self.handle_stop_request(&delivery.body).await,
            other => debug!("Ignoring delivery on topic {}", other),
        }
    }

    async fn handle_job_request(&self, body: &[u8]) {
        let mut req: JobRequest = match serde_json::from_slice(body) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to decode job request: {}", e);
                error!("{}", String::from_utf8_lossy(body));
                return;
            }
        };

        if !req.job.has_request_disk() {
            req.job.request_disk = Some(self.default_request_disk.clone());
        }

        match req.command {
            Command::Launch => self.launch(req.job).await,
            other => debug!(
                "Ignoring {:?} command for job {}",
                other, req.job.invocation_id
            ),
        }
    }

    async fn launch(&self, mut job: JobDescription) {
        let launcher = Arc::clone(&self.launcher);
        let launch_job = job.clone();
        let result = tokio::task::spawn_blocking(move || launcher.launch(&launch_job))
            .await
            .map_err(|e| format!("launch task panicked: {}", e))
            .and_then(|r| r.map_err(|e| e.to_string()));

        let update = match result {
            Ok(condor_id) => {
                info!("Launched Condor ID {}", condor_id);
                let message = format!("Launched Condor ID {}", condor_id);
                job.condor_id = Some(condor_id);
                StatusUpdate::submitted(job, message)
            }
            Err(e) => {
                error!("Failed to launch job {}: {}", job.invocation_id, e);
                StatusUpdate::failed(
                    job,
                    format!("condor-launcher failed to launch job:\n {}", e),
                )
            }
        };

        self.publish(&update).await;
    }

    async fn handle_stop_request(&self, body: &[u8]) {
        let req: StopRequest = match serde_json::from_slice(body) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to decode stop request: {}", e);
                error!("{}", String::from_utf8_lossy(body));
                return;
            }
        };

        let launcher = Arc::clone(&self.launcher);
        let invocation_id = req.invocation_id;
        let lookup = tokio::task::spawn_blocking(move || {
            launcher.scheduler().find_by_invocation(invocation_id)
        })
        .await;

        let condor_ids = match lookup {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                error!("Failed to look up jobs for invocation {}: {}", invocation_id, e);
                return;
            }
            Err(e) => {
                error!("Job lookup for invocation {} panicked: {}", invocation_id, e);
                return;
            }
        };

        if condor_ids.is_empty() {
            info!("No cluster jobs found for invocation {}", invocation_id);
            return;
        }

        for condor_id in condor_ids {
            let mut job = JobDescription::new(invocation_id, String::new(), Vec::new());
            job.condor_id = Some(condor_id.clone());

            let launcher = Arc::clone(&self.launcher);
            let stop_job = job.clone();
            match tokio::task::spawn_blocking(move || launcher.stop(&stop_job)).await {
                Ok(Ok(_)) => {
                    info!("Stopped Condor ID {} for invocation {}", condor_id, invocation_id);
                    let message = if req.reason.is_empty() {
                        format!("Stopped Condor ID {}", condor_id)
                    } else {
                        format!("Stopped Condor ID {}: {}", condor_id, req.reason)
                    };
                    self.publish(&StatusUpdate::new(job, JobState::Killed, message))
                        .await;
                }
                Ok(Err(e)) => error!("Failed to stop Condor ID {}: {}", condor_id, e),
                Err(e) => error!("Stop of Condor ID {} panicked: {}", condor_id, e),
            }
        }
    }

    async fn publish(&self, update: &StatusUpdate) {
        if let Err(e) = self.publisher.publish_job_update(update).await {
            error!(
                "Failed to publish {} update for job {}: {}",
                update.state, update.job.invocation_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SubmissionBundle;
    use crate::testing::{FakeScheduler, alice_job, config_in};
    use async_trait::async_trait;
    use condor_bus::{BusError, MemoryBus};
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;

    /// Consumer that fails with queued errors before handing out deliveries
    struct FailingFirstConsumer {
        bus: Arc<MemoryBus>,
        errors: Mutex<Vec<BusError>>,
    }

    #[async_trait]
    impl JobConsumer for FailingFirstConsumer {
        async fn recv(&self) -> condor_bus::Result<Option<Delivery>> {
            let next_error = self.errors.lock().unwrap().pop();
            match next_error {
                Some(e) => Err(e),
                None => self.bus.recv().await,
            }
        }

        async fn ack(&self, delivery: &Delivery) -> condor_bus::Result<()> {
            self.bus.ack(delivery).await
        }
    }

    fn dispatcher(base: &Path, scheduler: Arc<FakeScheduler>, bus: Arc<MemoryBus>) -> Dispatcher {
        let config = config_in(base);
        let default_disk = config.condor.request_disk.clone();
        let launcher = Arc::new(Launcher::new(config, scheduler));
        Dispatcher::new(launcher, bus.clone(), bus, default_disk)
    }

    async fn deliver(dispatcher: &Dispatcher, bus: &MemoryBus, topic: &str, body: Vec<u8>) {
        bus.push(topic, body).unwrap();
        let delivery = bus.recv().await.unwrap().unwrap();
        dispatcher.handle_delivery(delivery).await;
    }

    #[tokio::test]
    async fn test_launch_publishes_submitted() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::submitting("4242"));
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = dispatcher(base.path(), scheduler.clone(), bus.clone());
        let job = alice_job();

        let body = serde_json::to_vec(&JobRequest::launch(job.clone())).unwrap();
        deliver(&dispatcher, &bus, topics::LAUNCHES, body).await;

        assert_eq!(bus.acked(), vec![1]);

        let dir = job.submission_directory(base.path());
        assert!(dir.join("logs").is_dir());
        let submit = std::fs::read_to_string(dir.join("iplant.cmd")).unwrap();
        assert!(submit.contains("request_disk = 0\n"));
        assert!(!submit.contains("accounting_group"));
        for name in ["config", "job", "irods-config"] {
            assert!(dir.join(name).is_file(), "{} missing", name);
        }
        assert_eq!(scheduler.submitted.lock().unwrap().len(), 1);

        let updates = bus.published_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, JobState::Submitted);
        assert_eq!(updates[0].message, "Launched Condor ID 4242");
        assert_eq!(updates[0].job.condor_id.as_deref(), Some("4242"));
        assert_eq!(updates[0].job.invocation_id, job.invocation_id);
    }

    #[tokio::test]
    async fn test_failed_submit_publishes_output() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::failing_submit(
            "ERROR: Failed to connect to local queue manager",
        ));
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = dispatcher(base.path(), scheduler, bus.clone());

        let body = serde_json::to_vec(&JobRequest::launch(alice_job())).unwrap();
        deliver(&dispatcher, &bus, topics::LAUNCHES, body).await;

        let updates = bus.published_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, JobState::Failed);
        assert!(updates[0].message.starts_with("condor-launcher failed to launch job:"));
        assert!(updates[0]
            .message
            .contains("Failed to connect to local queue manager"));
        assert!(updates[0].job.condor_id.is_none());
    }

    #[tokio::test]
    async fn test_job_without_steps_fails() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::submitting("1"));
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = dispatcher(base.path(), scheduler.clone(), bus.clone());
        let mut job = alice_job();
        job.steps.clear();

        let body = serde_json::to_vec(&JobRequest::launch(job)).unwrap();
        deliver(&dispatcher, &bus, topics::LAUNCHES, body).await;

        assert!(scheduler.submitted.lock().unwrap().is_empty());
        let updates = bus.published_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, JobState::Failed);
        assert!(updates[0].message.contains("has no steps"));
    }

    #[tokio::test]
    async fn test_malformed_request_is_dropped() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::submitting("1"));
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = dispatcher(base.path(), scheduler.clone(), bus.clone());

        deliver(&dispatcher, &bus, topics::LAUNCHES, b"{not json".to_vec()).await;

        assert_eq!(bus.acked().len(), 1);
        assert!(bus.published().is_empty());
        assert!(scheduler.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_commands_are_ignored() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::submitting("1"));
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = dispatcher(base.path(), scheduler.clone(), bus.clone());

        for command in ["stop", "reticulate"] {
            let body = serde_json::to_vec(&json!({
                "command": command,
                "job": alice_job(),
            }))
            .unwrap();
            deliver(&dispatcher, &bus, topics::LAUNCHES, body).await;
        }

        assert_eq!(bus.acked().len(), 2);
        assert!(bus.published().is_empty());
        assert!(scheduler.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_disk_is_kept_when_present() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::submitting("1"));
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = dispatcher(base.path(), scheduler, bus.clone());
        let mut job = alice_job();
        job.request_disk = Some("2048".to_string());

        let body = serde_json::to_vec(&JobRequest::launch(job.clone())).unwrap();
        deliver(&dispatcher, &bus, topics::LAUNCHES, body).await;

        let dir = job.submission_directory(base.path());
        let submit = std::fs::read_to_string(dir.join("iplant.cmd")).unwrap();
        assert!(submit.contains("request_disk = 2048\n"));
        let updates = bus.published_updates();
        assert_eq!(updates[0].job.request_disk.as_deref(), Some("2048"));
    }

    #[tokio::test]
    async fn test_stop_request_removes_each_cluster_job() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler {
            by_invocation: vec!["5".to_string(), "6".to_string()],
            failing_removals: vec!["6".to_string()],
            ..Default::default()
        });
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = dispatcher(base.path(), scheduler.clone(), bus.clone());
        let stop = StopRequest {
            invocation_id: uuid::Uuid::new_v4(),
            reason: "user cancelled".to_string(),
        };

        deliver(
            &dispatcher,
            &bus,
            topics::STOPS,
            serde_json::to_vec(&stop).unwrap(),
        )
        .await;

        assert_eq!(
            *scheduler.removed.lock().unwrap(),
            vec!["5".to_string(), "6".to_string()]
        );
        let updates = bus.published_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, JobState::Killed);
        assert_eq!(updates[0].job.invocation_id, stop.invocation_id);
        assert_eq!(updates[0].message, "Stopped Condor ID 5: user cancelled");
    }

    #[tokio::test]
    async fn test_concurrent_launches_use_separate_directories() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::submitting("1"));
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = dispatcher(base.path(), scheduler.clone(), bus.clone());

        let (a, b) = (alice_job(), alice_job());
        tokio::join!(dispatcher.launch(a.clone()), dispatcher.launch(b.clone()));

        let submitted = scheduler.submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 2);
        assert_ne!(submitted[0].parent(), submitted[1].parent());
        for job in [&a, &b] {
            let dir = job.submission_directory(base.path());
            let doc = std::fs::read_to_string(dir.join("job")).unwrap();
            let written: JobDescription = serde_json::from_str(&doc).unwrap();
            assert_eq!(written.invocation_id, job.invocation_id);
            let rendered = SubmissionBundle::render(job, &config_in(base.path())).unwrap();
            assert_eq!(
                std::fs::read_to_string(dir.join("iplant.cmd")).unwrap(),
                rendered.submit_file
            );
        }
        assert_eq!(bus.published_updates().len(), 2);
    }

    #[tokio::test]
    async fn test_run_drains_until_closed() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::submitting("77"));
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = dispatcher(base.path(), scheduler, bus.clone());

        bus.push_json(topics::LAUNCHES, &JobRequest::launch(alice_job()))
            .unwrap();
        bus.push(topics::UPDATES, b"{}".to_vec()).unwrap();
        bus.close();

        dispatcher.run().await.unwrap();

        assert_eq!(bus.acked(), vec![1, 2]);
        let updates = bus.published_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, JobState::Submitted);
    }

    #[tokio::test]
    async fn test_run_survives_receive_error() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::submitting("31"));
        let bus = Arc::new(MemoryBus::new());
        let consumer = Arc::new(FailingFirstConsumer {
            bus: bus.clone(),
            errors: Mutex::new(vec![BusError::Transport(
                "message has no body frame".to_string(),
            )]),
        });
        let config = config_in(base.path());
        let launcher = Arc::new(Launcher::new(config, scheduler.clone()));
        let dispatcher = Dispatcher::new(launcher, consumer.clone(), bus.clone(), "0");

        bus.push_json(topics::LAUNCHES, &JobRequest::launch(alice_job()))
            .unwrap();
        bus.close();

        dispatcher.run().await.unwrap();

        assert!(consumer.errors.lock().unwrap().is_empty());
        assert_eq!(scheduler.submitted.lock().unwrap().len(), 1);
        let updates = bus.published_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, JobState::Submitted);
        assert_eq!(updates[0].message, "Launched Condor ID 31");
    }

    #[tokio::test]
    async fn test_run_stops_on_closed_bus() {
        let base = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::submitting("1"));
        let bus = Arc::new(MemoryBus::new());
        let consumer = Arc::new(FailingFirstConsumer {
            bus: bus.clone(),
            errors: Mutex::new(vec![BusError::Closed]),
        });
        let launcher = Arc::new(Launcher::new(config_in(base.path()), scheduler.clone()));
        let dispatcher = Dispatcher::new(launcher, consumer, bus.clone(), "0");

        bus.push_json(topics::LAUNCHES, &JobRequest::launch(alice_job()))
            .unwrap();

        dispatcher.run().await.unwrap();

        assert!(scheduler.submitted.lock().unwrap().is_empty());
        assert!(bus.published().is_empty());
    }
}
