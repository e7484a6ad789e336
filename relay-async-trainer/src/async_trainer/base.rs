use crate::{AsyncTrainStat, AsyncTrainerConfig, EpisodeMessage};
use anyhow::{anyhow, Result};
use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use log::{error, info, trace, warn};
use relay_core::{
    error::RelayError,
    record::{Record, RecordValue::Scalar, Recorder},
    BatchBase, Brain, ExperienceBufferBase, SamplingPolicy, SamplingStrategy, SharedBuffer,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime},
};

/// Manages the optimization loop in a single machine.
///
/// [`AsyncTrainer::train`] runs `n_optimizers` threads, each taking batches
/// from the shared buffer through the configured sampling strategy and
/// training the shared brain. Records of the optimization steps and the
/// episodes reported by [Actor](crate::Actor)s are collected on the calling
/// thread and handed to a [`Recorder`].
///
/// It will be used with [ActorManager](crate::ActorManager).
pub struct AsyncTrainer {
    config: AsyncTrainerConfig,
    strategy: SamplingStrategy,

    /// Optimizers exit when this flag becomes `true`.
    stop: Arc<Mutex<bool>>,
}

impl AsyncTrainer {
    /// Creates [AsyncTrainer].
    pub fn build(config: &AsyncTrainerConfig, stop: Arc<Mutex<bool>>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            strategy: SamplingStrategy::build(&config.sampling_config)?,
            stop,
        })
    }

    /// Stops the optimizers.
    pub fn stop(&self) {
        *self.stop.lock().unwrap() = true;
    }

    fn is_stopped(&self) -> bool {
        *self.stop.lock().unwrap()
    }

    /// Runs the optimizers until `max_opts` optimization steps are done, the
    /// stop flag is set, or an optimizer fails.
    ///
    /// An error of any optimizer sets the stop flag, which also stops the
    /// actors sharing it, and is returned once all optimizers have exited.
    pub fn train<O, B, R>(
        &self,
        brain: &B,
        buffer: &SharedBuffer<O, B::State>,
        episode_receiver: Receiver<EpisodeMessage>,
        recorder: &mut R,
    ) -> Result<AsyncTrainStat>
    where
        O: Clone + Send,
        B: Brain<O> + Sync,
        B::State: Send,
        R: Recorder,
    {
        if self.config.sampling_config.is_prioritized() && !buffer.is_prioritized() {
            return Err(RelayError::invalid(
                "prioritized sampling needs a buffer configured with PerConfig",
            )
            .into());
        }

        let opt_steps = AtomicUsize::new(0);
        let n_samples = AtomicUsize::new(0);
        let mut stat = AsyncTrainStat::default();
        let time = SystemTime::now();
        let (record_sender, record_receiver) = unbounded();

        let results = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.config.n_optimizers);
            for id in 0..self.config.n_optimizers {
                let sender = record_sender.clone();
                let (opt_steps, n_samples) = (&opt_steps, &n_samples);
                let spawned = std::thread::Builder::new()
                    .name(format!("optimizer-{}", id))
                    .spawn_scoped(scope, move || {
                        let result = self.optimize(brain, buffer, opt_steps, n_samples, sender);
                        if let Err(e) = &result {
                            error!("Optimizer {} failed: {}", id, e);
                            self.stop();
                        }
                        result
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        self.stop();
                        return vec![Err(anyhow::Error::from(e))];
                    }
                }
            }
            info!("Started {} optimizer threads", self.config.n_optimizers);
            drop(record_sender);

            self.receive_records(
                record_receiver,
                episode_receiver,
                buffer,
                &opt_steps,
                recorder,
                &mut stat,
            );

            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(anyhow!("optimizer thread panicked")))
                })
                .collect::<Vec<_>>()
        });
        results.into_iter().collect::<Result<Vec<_>>>()?;

        let duration = time.elapsed().unwrap_or_default();
        let secs = duration.as_secs_f32().max(f32::EPSILON);
        stat.opt_steps = opt_steps.load(Ordering::SeqCst).min(self.config.max_opts);
        stat.duration = duration;
        stat.opt_per_sec = stat.opt_steps as f32 / secs;
        stat.samples_per_sec = n_samples.load(Ordering::SeqCst) as f32 / secs;
        info!("Finished {} optimization steps", stat.opt_steps);

        Ok(stat)
    }

    /// Optimization loop of a single optimizer thread.
    fn optimize<O, B>(
        &self,
        brain: &B,
        buffer: &SharedBuffer<O, B::State>,
        opt_steps: &AtomicUsize,
        n_samples: &AtomicUsize,
        sender: Sender<(usize, Record)>,
    ) -> Result<()>
    where
        O: Clone,
        B: Brain<O>,
    {
        let idle = Duration::from_millis(self.config.idle_wait_ms);
        let max_opts = self.config.max_opts;
        let done = || self.is_stopped() || opt_steps.load(Ordering::SeqCst) >= max_opts;

        while buffer.len() < self.config.warmup_period {
            if done() {
                return Ok(());
            }
            std::thread::sleep(idle);
        }

        while !done() {
            let batch = match self.strategy.drain(buffer) {
                Ok(batch) if !batch.is_empty() => batch,
                Ok(_) | Err(RelayError::EmptyDistribution) => {
                    std::thread::sleep(idle);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            // Reserve the step so that exactly `max_opts` batches are trained.
            let step = opt_steps.fetch_add(1, Ordering::SeqCst);
            if step >= max_opts {
                break;
            }
            let outcome = brain.train(&batch)?;
            n_samples.fetch_add(batch.len(), Ordering::SeqCst);
            self.strategy
                .feedback(buffer, &batch, outcome.errors.as_deref())?;

            let step = step + 1;
            if step % self.config.sync_interval == 0 {
                brain.sync_target()?;
                trace!("Synchronized target at step {}", step);
            }
            if sender.send((step, outcome.record)).is_err() {
                break;
            }
        }

        Ok(())
    }

    /// Receives records until every optimizer has exited.
    fn receive_records<O, S, R>(
        &self,
        records: Receiver<(usize, Record)>,
        episodes: Receiver<EpisodeMessage>,
        buffer: &SharedBuffer<O, S>,
        opt_steps: &AtomicUsize,
        recorder: &mut R,
        stat: &mut AsyncTrainStat,
    ) where
        O: Clone,
        S: Clone,
        R: Recorder,
    {
        let closed = never();
        let mut episodes_open = true;
        let idle = Duration::from_millis(self.config.idle_wait_ms.max(1));
        let mut time = SystemTime::now();
        let mut opt_steps_ = 0;

        loop {
            let episode_rx = if episodes_open { &episodes } else { &closed };
            select! {
                recv(records) -> msg => match msg {
                    Ok((step, record)) => {
                        opt_steps_ += 1;
                        recorder.store(record);
                        if step % self.config.record_interval == 0 {
                            let duration = time.elapsed().unwrap_or_default().as_secs_f32();
                            let ops = opt_steps_ as f32 / duration.max(f32::EPSILON);
                            recorder.store(Record::from_scalar("opt_per_sec", ops));
                            recorder.flush(step as i64);
                            opt_steps_ = 0;
                            time = SystemTime::now();
                        }
                    }
                    Err(_) => break,
                },
                recv(episode_rx) -> msg => match msg {
                    Ok(msg) => {
                        stat.episodes += 1;
                        let mut record = Record::from_scalar("episode_reward", msg.total_reward);
                        record.insert("episode_steps", Scalar(msg.steps as f32));
                        recorder.store(record);
                    }
                    Err(_) => {
                        info!("All actors exited");
                        episodes_open = false;
                    }
                },
                default(idle) => {
                    let len = buffer.len();
                    let warm = opt_steps.load(Ordering::SeqCst) > 0
                        || len >= self.config.warmup_period;
                    if !episodes_open && (len == 0 || !warm) {
                        warn!("No actor is left to fill the buffer, stopping optimizers");
                        self.stop();
                    }
                }
            }
        }
    }
}
