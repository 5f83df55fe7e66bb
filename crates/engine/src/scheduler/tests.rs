#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use runq_core::{
        EngineConfig, InteractiveProcess, Job, JobDescription, JobFailure, JobId, JobState,
        ProcessFactory, QueuePolicy, Scheduler, SchedulerError, Streams,
    };

    use crate::scheduler::LocalScheduler;

    /// Mock process that finishes once its run time has elapsed.
    struct TimedProcess {
        finish_at: Instant,
        killed: AtomicBool,
    }

    impl InteractiveProcess for TimedProcess {
        fn is_done(&self) -> bool {
            self.killed.load(Ordering::SeqCst) || Instant::now() >= self.finish_at
        }

        fn exit_status(&self) -> Option<i32> {
            if self.killed.load(Ordering::SeqCst) {
                Some(137)
            } else {
                self.is_done().then_some(0)
            }
        }

        fn destroy(&self) -> io::Result<()> {
            self.killed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn take_streams(&self) -> Option<Streams> {
            None
        }
    }

    /// Mock factory: the first argument is the run time in milliseconds,
    /// executable "missing" fails to spawn.
    #[derive(Default)]
    struct TimedFactory {
        created: AtomicUsize,
    }

    impl ProcessFactory for TimedFactory {
        fn create(&self, job: &Job) -> io::Result<Box<dyn InteractiveProcess>> {
            let desc = job.description();
            if desc.executable == "missing" {
                return Err(io::Error::new(io::ErrorKind::NotFound, "missing: not found"));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            let ms = desc
                .arguments
                .first()
                .and_then(|a| a.parse().ok())
                .unwrap_or(0);
            Ok(Box::new(TimedProcess {
                finish_at: Instant::now() + Duration::from_millis(ms),
                killed: AtomicBool::new(false),
            }))
        }
    }

    /// Factory whose process creation takes a noticeable time.
    struct SlowFactory {
        inner: TimedFactory,
        delay: Duration,
    }

    impl ProcessFactory for SlowFactory {
        fn create(&self, job: &Job) -> io::Result<Box<dyn InteractiveProcess>> {
            std::thread::sleep(self.delay);
            self.inner.create(job)
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            polling_delay_ms: 100,
            multi_q_max_concurrent_jobs: 2,
            ..EngineConfig::default()
        }
    }

    fn engine() -> (LocalScheduler, Arc<TimedFactory>) {
        let factory = Arc::new(TimedFactory::default());
        let engine = LocalScheduler::with_factory(test_config(), factory.clone()).unwrap();
        (engine, factory)
    }

    fn sleeper(ms: u64, queue: &str) -> JobDescription {
        JobDescription::new("sleeper")
            .with_args([ms.to_string()])
            .with_queue(queue)
    }

    #[test]
    fn construction_rejects_bad_config() {
        let mut config = test_config();
        config.polling_delay_ms = 10;
        let result = LocalScheduler::with_factory(config, Arc::new(TimedFactory::default()));
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn queues_and_default_queue() {
        let (engine, _) = engine();
        assert_eq!(engine.get_queue_names(), vec!["single", "multi", "unlimited"]);
        assert_eq!(engine.get_default_queue_name(), "single");

        let multi = engine.get_queue_status("multi").unwrap();
        assert_eq!(multi.policy, Some(QueuePolicy::Multi(2)));

        let job = engine.submit_job(sleeper(0, "")).unwrap();
        assert_eq!(job.queue_name(), "single");
    }

    #[test]
    fn unknown_queue_is_rejected() {
        let (engine, factory) = engine();
        let err = engine.submit_job(sleeper(0, "gpu")).unwrap_err();
        assert!(matches!(err, SchedulerError::NoSuchQueue(name) if name == "gpu"));
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_description_creates_no_job() {
        let (engine, _) = engine();
        let mut desc = sleeper(0, "single");
        desc.node_count = 4;
        assert!(matches!(
            engine.submit_job(desc),
            Err(SchedulerError::InvalidJobDescription(_))
        ));
        assert!(matches!(
            engine.submit_job(JobDescription::new("")),
            Err(SchedulerError::IncompleteJobDescription(_))
        ));

        let job = engine.submit_job(sleeper(0, "single")).unwrap();
        assert!(job.id().as_str().starts_with("local-"));
        assert!(job.id().as_str().ends_with("-0"));
        assert_eq!(engine.get_jobs(&[]).unwrap().len(), 1);
    }

    #[test]
    fn job_ids_are_unique() {
        let (engine, _) = engine();
        let mut ids: Vec<JobId> = (0..50)
            .map(|_| engine.submit_job(sleeper(0, "unlimited")).unwrap().id().clone())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn interactive_flag_selects_submission_path() {
        let (engine, _) = engine();
        let interactive = JobDescription::new("cat").interactive();
        assert!(matches!(
            engine.submit_job(interactive.clone()),
            Err(SchedulerError::InvalidJobDescription(_))
        ));
        assert!(matches!(
            engine.submit_interactive_job(sleeper(0, "single")),
            Err(SchedulerError::InvalidJobDescription(_))
        ));
        let job = engine.submit_interactive_job(interactive).unwrap();
        assert!(job.is_interactive());
    }

    #[test]
    fn single_status_errors_but_batch_returns_placeholder() {
        let (engine, _) = engine();
        let known = engine.submit_job(sleeper(5_000, "single")).unwrap();
        let stranger = Job::new(JobId::new("local", 999), JobDescription::new("x"), "single");
        let wrong_queue = Job::new(JobId::new("local", 998), JobDescription::new("x"), "gpu");

        assert!(matches!(
            engine.get_job_status(&stranger),
            Err(SchedulerError::NoSuchJob(_))
        ));
        assert!(matches!(
            engine.get_job_status(&wrong_queue),
            Err(SchedulerError::NoSuchJob(_))
        ));
        assert!(matches!(engine.cancel_job(&stranger), Err(SchedulerError::NoSuchJob(_))));

        let statuses = engine
            .get_job_statuses(&[known.clone(), stranger, wrong_queue])
            .unwrap();
        assert_eq!(statuses.len(), 3);
        assert_ne!(statuses[0].state, JobState::Unknown);
        assert_eq!(statuses[1].state, JobState::Unknown);
        assert_eq!(statuses[1].error, Some(JobFailure::NoSuchJob("local-999".into())));
        assert_eq!(statuses[2].state, JobState::Unknown);
    }

    #[test]
    fn queue_status_asymmetry() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.get_queue_status("gpu"),
            Err(SchedulerError::NoSuchQueue(_))
        ));
        let statuses = engine.get_queue_statuses(&["single", "gpu"]).unwrap();
        assert!(!statuses[0].has_error());
        assert!(statuses[1].has_error());
        assert_eq!(engine.get_queue_statuses(&[]).unwrap().len(), 3);
    }

    #[test]
    fn get_jobs_filters_by_queue() {
        let (engine, _) = engine();
        engine.submit_job(sleeper(5_000, "single")).unwrap();
        engine.submit_job(sleeper(5_000, "multi")).unwrap();
        engine.submit_job(sleeper(5_000, "multi")).unwrap();

        assert_eq!(engine.get_jobs(&["multi"]).unwrap().len(), 2);
        assert_eq!(engine.get_jobs(&["single", "multi"]).unwrap().len(), 3);
        assert_eq!(engine.get_jobs(&[]).unwrap().len(), 3);
        assert!(matches!(
            engine.get_jobs(&["gpu"]),
            Err(SchedulerError::NoSuchQueue(_))
        ));
    }

    #[test]
    fn wait_timeout_validation() {
        let (engine, _) = engine();
        let job = engine.submit_job(sleeper(5_000, "single")).unwrap();

        assert!(matches!(
            engine.wait_until_done(&job, -1),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.wait_until_running(&job, -5),
            Err(SchedulerError::InvalidArgument(_))
        ));

        let start = Instant::now();
        let status = engine.wait_until_done(&job, 0).unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(!status.is_done());
    }

    #[test]
    fn wait_until_done_observes_completion() {
        let (engine, _) = engine();
        let job = engine.submit_job(sleeper(200, "unlimited")).unwrap();
        let running = engine.wait_until_running(&job, 2_000).unwrap();
        assert!(running.is_running() || running.is_done());

        let done = engine.wait_until_done(&job, 3_000).unwrap();
        assert!(done.is_done());
        assert_eq!(done.exit_code, Some(0));
        assert!(done.error.is_none());
        assert!(done.started_at.is_some());
        assert!(done.finished_at.is_some());
    }

    #[test]
    fn wait_returns_last_status_on_timeout() {
        let (engine, _) = engine();
        let job = engine.submit_job(sleeper(10_000, "unlimited")).unwrap();
        let start = Instant::now();
        let status = engine.wait_until_done(&job, 300).unwrap();
        let elapsed = start.elapsed();
        assert!(!status.is_done());
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(1_000));
    }

    #[test]
    fn creation_failure_surfaces_in_status() {
        let (engine, _) = engine();
        let job = engine
            .submit_job(JobDescription::new("missing").with_queue("single"))
            .unwrap();
        let status = engine.wait_until_done(&job, 2_000).unwrap();
        assert!(status.is_done());
        assert!(!status.is_running());
        assert!(status.exit_code.is_none());
        assert!(matches!(status.error, Some(JobFailure::ProcessCreation(_))));
    }

    #[test]
    fn max_runtime_is_enforced_softly() {
        let (engine, _) = engine();
        let job = engine
            .submit_job(sleeper(10_000, "unlimited").with_max_runtime_ms(150))
            .unwrap();
        let status = engine.wait_until_done(&job, 3_000).unwrap();
        assert!(status.is_done());
        assert_eq!(status.error, Some(JobFailure::TimedOut(150)));
        assert_eq!(engine.metrics().timed_out("unlimited"), 1);
    }

    #[test]
    fn end_is_idempotent_and_closes_operations() {
        let (engine, _) = engine();
        let job = engine.submit_job(sleeper(10_000, "single")).unwrap();
        engine.submit_job(sleeper(10_000, "single")).unwrap();

        engine.end();
        engine.end();
        assert!(!engine.is_open());
        assert!(matches!(
            engine.submit_job(sleeper(0, "single")),
            Err(SchedulerError::ClosedEngine)
        ));
        assert!(matches!(engine.get_job_status(&job), Err(SchedulerError::ClosedEngine)));
        assert!(matches!(engine.cancel_job(&job), Err(SchedulerError::ClosedEngine)));
        assert!(matches!(
            engine.wait_until_done(&job, 100),
            Err(SchedulerError::ClosedEngine)
        ));
    }

    #[test]
    fn usable_through_scheduler_trait() {
        let (engine, _) = engine();
        let scheduler: &dyn Scheduler = &engine;
        assert_eq!(scheduler.adaptor_name(), "local");
        let job = scheduler.submit_job(sleeper(0, "unlimited")).unwrap();
        let status = scheduler.wait_until_done(&job, 2_000).unwrap();
        assert!(status.is_done());

        let metrics = engine.metrics();
        assert_eq!(metrics.submitted("unlimited"), 1);
        assert_eq!(metrics.started("unlimited"), 1);
        assert!(metrics.poll_ticks >= 1);
    }

    #[test]
    fn cancel_while_process_is_being_created_is_synchronous() {
        let factory = Arc::new(SlowFactory {
            inner: TimedFactory::default(),
            delay: Duration::from_millis(600),
        });
        let engine = LocalScheduler::with_factory(test_config(), factory).unwrap();
        let job = engine.submit_job(sleeper(5_000, "single")).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(engine.get_job_status(&job).unwrap().state, JobState::Pending);
        let cancelled = engine.cancel_job(&job).unwrap();
        assert_eq!(cancelled.state, JobState::Done);
        assert!(cancelled.was_cancelled());
        assert!(cancelled.exit_code.is_none());
        assert!(cancelled.started_at.is_none());

        // Once creation returns, the job stays cancelled and never runs.
        std::thread::sleep(Duration::from_millis(800));
        let status = engine.get_job_status(&job).unwrap();
        assert_eq!(status, cancelled);
        let metrics = engine.metrics();
        assert_eq!(metrics.started("single"), 0);
        assert_eq!(metrics.cancelled("single"), 1);
        assert_eq!(engine.get_queue_status("single").unwrap().running, 0);
    }

    #[test]
    fn job_handles_do_not_cross_engines() {
        let (first, _) = engine();
        let (second, _) = engine();
        let a = first.submit_job(sleeper(5_000, "single")).unwrap();
        let b = second.submit_job(sleeper(5_000, "single")).unwrap();

        assert_ne!(a.id(), b.id());
        assert!(matches!(second.get_job_status(&a), Err(SchedulerError::NoSuchJob(_))));
        assert!(matches!(second.cancel_job(&a), Err(SchedulerError::NoSuchJob(_))));
        assert!(!second.get_job_status(&b).unwrap().is_done());
    }

    #[test]
    fn concurrent_callers_respect_caps_and_get_unique_ids() {
        const THREADS: usize = 4;
        const JOBS_PER_THREAD: usize = 12;
        const QUEUES: [&str; 4] = ["single", "multi", "unlimited", "unlimited"];

        let (engine, _) = engine();
        let submitted = Mutex::new(Vec::new());
        let stop = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let observer = scope.spawn(|| {
                let mut observations = 0usize;
                while !stop.load(Ordering::SeqCst) {
                    for status in engine.get_queue_statuses(&["single", "multi"]).unwrap() {
                        let cap = status.policy.and_then(|p| p.capacity()).unwrap();
                        assert!(
                            status.running <= cap,
                            "{} ran {} jobs with cap {}",
                            status.name,
                            status.running,
                            cap
                        );
                    }
                    observations += 1;
                    std::thread::sleep(Duration::from_millis(5));
                }
                observations
            });

            let workers: Vec<_> = (0..THREADS)
                .map(|t| {
                    let engine = &engine;
                    let submitted = &submitted;
                    scope.spawn(move || {
                        for n in 0..JOBS_PER_THREAD {
                            let queue = QUEUES[(t + n) % QUEUES.len()];
                            let job = engine.submit_job(sleeper(20, queue)).unwrap();
                            if n % 3 == 0 {
                                assert!(engine.cancel_job(&job).is_ok());
                            }
                            assert!(engine.get_job_status(&job).is_ok());
                            submitted.lock().unwrap().push(job);
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            for job in submitted.lock().unwrap().iter() {
                assert!(engine.wait_until_done(job, 20_000).unwrap().is_done());
            }
            stop.store(true, Ordering::SeqCst);
            assert!(observer.join().unwrap() > 0);
        });

        let jobs = submitted.into_inner().unwrap();
        let mut ids: Vec<JobId> = jobs.iter().map(|j| j.id().clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), THREADS * JOBS_PER_THREAD);

        let metrics = engine.metrics();
        let total: u64 = QUEUES[..3].iter().map(|q| metrics.submitted(q)).sum();
        assert_eq!(total as usize, THREADS * JOBS_PER_THREAD);
    }
}
