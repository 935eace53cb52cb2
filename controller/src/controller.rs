//! The reconcile loop: a per-`namespace/name` work queue serializes each
//! StackSet's reconciles while letting unrelated StackSets run concurrently,
//! the same `DelayQueue` + `in_queue` guard construction the host project's
//! `PodAutoscaler` uses.

use std::collections::{HashMap, HashSet};

use chrono::{Duration as ChronoDuration, Local};
use futures_delay_queue::{delay_queue, DelayQueue};
use futures_intrusive::{buffer::GrowingHeapBuf, channel::shared::GenericReceiver};
use parking_lot::RawMutex;
use resources::{
    client,
    config::ControllerConfig,
    informer::{EventHandler, Informer, ResyncHandler, Store},
    objects::{stack::Stack, stackset::StackSet},
};
use tokio::{select, sync::mpsc, task::JoinHandle};

use crate::{
    autoscaler::synth,
    core::{lifecycle, traffic, StackSetContainer},
    errors::{ControllerError, Result},
    utils,
};

pub struct StackSetController {
    config: ControllerConfig,
    rx: mpsc::Receiver<String>,
    resync_rx: mpsc::Receiver<()>,
    stackset_informer: Option<JoinHandle<anyhow::Result<()>>>,
    stack_informer: Option<JoinHandle<anyhow::Result<()>>>,
    stackset_store: Store<StackSet>,
    stack_store: Store<Stack>,
    work_queue: DelayQueue<String, GrowingHeapBuf<String>>,
    work_queue_rx: GenericReceiver<RawMutex, String, GrowingHeapBuf<String>>,
    in_queue: HashSet<String>,
    /// Consecutive `TransientApiError` count per key, used to compute the
    /// exponential backoff delay; reset to zero on the next successful (or
    /// non-transient) reconcile of that key.
    retry_attempts: HashMap<String, u32>,
}

/// Base delay for the first `TransientApiError` retry of a key.
const BASE_BACKOFF_SECS: u64 = 5;
/// Ceiling on the exponential backoff delay, so a persistently failing
/// StackSet doesn't end up requeued hours apart.
const MAX_BACKOFF_SECS: u64 = 300;

/// `5 * 2^attempts`, capped at `MAX_BACKOFF_SECS`.
fn backoff_delay(attempts: u32) -> std::time::Duration {
    let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
    let secs = BASE_BACKOFF_SECS.saturating_mul(factor).min(MAX_BACKOFF_SECS);
    std::time::Duration::from_secs(secs)
}

impl StackSetController {
    pub fn new(config: ControllerConfig) -> Self {
        let (tx, rx) = mpsc::channel::<String>(64);
        let (resync_tx, resync_rx) = mpsc::channel::<()>(16);

        let stackset_informer = Self::create_stackset_informer(&config, tx.clone(), resync_tx);
        let stackset_store = stackset_informer.get_store();
        let stack_informer = Self::create_stack_informer(&config, tx);
        let stack_store = stack_informer.get_store();

        let stackset_informer = tokio::spawn(async move { stackset_informer.run().await });
        let stack_informer = tokio::spawn(async move { stack_informer.run().await });

        let (work_queue, work_queue_rx) = delay_queue::<String>();

        Self {
            config,
            rx,
            resync_rx,
            stackset_informer: Some(stackset_informer),
            stack_informer: Some(stack_informer),
            stackset_store,
            stack_store,
            work_queue,
            work_queue_rx,
            in_queue: HashSet::new(),
            retry_attempts: HashMap::new(),
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        tracing::info!("StackSet controller started");
        loop {
            select! {
                Some(name) = self.rx.recv() => {
                    self.enqueue_now(name);
                },
                Some(()) = self.resync_rx.recv() => {
                    self.handle_resync();
                },
                Some(name) = self.work_queue_rx.receive() => {
                    self.in_queue.remove(&name);
                    match self.reconcile(&name).await {
                        Ok(()) => {
                            self.retry_attempts.remove(&name);
                            tracing::info!("reconciled stackset {name}");
                        },
                        Err(ControllerError::TransientApiError(e)) => {
                            let attempts = self.retry_attempts.entry(name.clone()).or_insert(0);
                            let delay = backoff_delay(*attempts);
                            *attempts += 1;
                            tracing::warn!(
                                "transient error reconciling {name}: {e:#}, requeuing in {delay:?} (attempt {})",
                                *attempts
                            );
                            self.enqueue_after(name, delay);
                            continue;
                        },
                        Err(e) => {
                            self.retry_attempts.remove(&name);
                            tracing::error!("error reconciling {name}: {e:#}");
                        },
                    }
                    self.enqueue_after(name, std::time::Duration::from_secs(self.config.sync_period_seconds));
                },
                else => break,
            }
        }

        if let Some(h) = self.stackset_informer.take() {
            h.await??;
        }
        if let Some(h) = self.stack_informer.take() {
            h.await??;
        }
        tracing::info!("StackSet controller exited");
        Ok(())
    }

    fn enqueue_now(&mut self, name: String) {
        if self.in_queue.insert(name.clone()) {
            self.work_queue.insert_at(name, std::time::Instant::now());
        }
    }

    fn enqueue_after(&mut self, name: String, duration: std::time::Duration) {
        if self.in_queue.insert(name.clone()) {
            self.work_queue.insert(name, duration);
        }
    }

    fn handle_resync(&mut self) {
        let keys: Vec<String> = self
            .stackset_store
            .iter()
            .map(|entry| stackset_key(&entry.value().metadata.namespace, &entry.value().metadata.name))
            .collect();
        for key in keys {
            self.enqueue_now(key);
        }
    }

    /// The five-step ordering: read cluster state, compute desired/actual,
    /// apply Stack status, apply child objects, apply StackSet status. Any
    /// step failing with `InvariantViolation` aborts before partial writes
    /// land; `TransientApiError` surfaces to the caller for backoff.
    async fn reconcile(&self, key: &str) -> Result<()> {
        let Some((namespace, stackset_name)) = key.split_once('/') else {
            tracing::warn!("malformed work queue key {key}, dropping");
            return Ok(());
        };

        let Some(stackset) = self
            .stackset_store
            .iter()
            .find(|entry| entry.value().metadata.namespace == namespace && entry.value().metadata.name == stackset_name)
            .map(|entry| entry.value().clone())
        else {
            tracing::info!("stackset {key} no longer exists, dropping");
            return Ok(());
        };

        let stacks = utils::stacks_owned_by(&self.stack_store, namespace, stackset_name);
        let mut container = StackSetContainer::new(stackset, stacks);

        if let Some(new_stack) = lifecycle::stack_to_create(&container) {
            tracing::info!("minting stack {} for stackset {key}", new_stack.metadata.name);
            utils::create_stack(&self.config, &new_stack).await?;
            container.insert_stack(new_stack);
        }

        traffic::reconcile(&mut container);
        if !traffic::weight_sum_invariant(&container) {
            return Err(ControllerError::InvariantViolation(format!(
                "stackset {stackset_name} actual traffic weights do not sum to 100 or 0"
            )));
        }

        let now = Local::now().naive_utc();
        let prescaling_timeout = ChronoDuration::seconds(self.config.prescaling_timeout_seconds);
        let prescaling_cooldown = ChronoDuration::seconds(self.config.prescaling_cooldown_seconds);
        for timeout in lifecycle::reconcile(&mut container, now, prescaling_timeout, prescaling_cooldown) {
            tracing::warn!("{timeout:#}");
        }

        // Synthesize every Stack's HPA before writing status, so a failed
        // translation's `InvalidMetricConfig` condition lands in the same
        // status write as the rest of this reconcile's outcome, per §7.
        let mut pending_hpas = Vec::new();
        for stack_container in container.stacks.values_mut() {
            match synth::synthesize(stack_container) {
                Ok(Some(hpa)) => {
                    stack_container.invalid_metric_config = None;
                    pending_hpas.push(hpa);
                },
                Ok(None) => {
                    stack_container.invalid_metric_config = None;
                },
                Err(ControllerError::InvalidMetricConfig(msg)) => {
                    tracing::warn!(
                        "metric translation failed for stack {}: {msg}, leaving its hpa untouched",
                        stack_container.name()
                    );
                    stack_container.invalid_metric_config = Some(msg);
                },
                Err(e) => {
                    tracing::warn!("hpa synthesis failed for stack {}: {e:#}", stack_container.name());
                    stack_container.invalid_metric_config = Some(e.to_string());
                },
            }
        }

        utils::apply_stack_status(&self.config, &container, now).await?;

        for hpa in &pending_hpas {
            if let Err(e) = utils::apply_hpa(&self.config, hpa).await {
                tracing::warn!("failed to apply hpa for {}: {e:#}", hpa.metadata.name);
            }
        }

        for deletable in lifecycle::deletable_stacks(&container, now) {
            if let Some(stack_container) = container.stacks.get(&deletable) {
                if let Err(e) = utils::delete_stack(&self.config, &stack_container.stack).await {
                    tracing::warn!("failed to delete stack {deletable}: {e:#}");
                }
            }
        }

        utils::apply_stackset_status(&self.config, &container).await?;
        Ok(())
    }

    fn create_stackset_informer(
        config: &ControllerConfig,
        tx: mpsc::Sender<String>,
        resync_tx: mpsc::Sender<()>,
    ) -> Informer<StackSet> {
        let lw = client::create_lister_watcher(config, "stacksets".to_string());
        let tx_add = tx;
        let tx_update = tx_add.clone();
        let eh = EventHandler::<StackSet> {
            add_cls: Box::new(move |new| {
                let tx_add = tx_add.clone();
                Box::pin(async move {
                    tx_add.send(stackset_key(&new.metadata.namespace, &new.metadata.name)).await?;
                    Ok(())
                })
            }),
            update_cls: Box::new(move |(_old, new)| {
                let tx_update = tx_update.clone();
                Box::pin(async move {
                    tx_update.send(stackset_key(&new.metadata.namespace, &new.metadata.name)).await?;
                    Ok(())
                })
            }),
            delete_cls: Box::new(move |_| Box::pin(async move { Ok(()) })),
        };
        let rh = ResyncHandler(Box::new(move |()| {
            let resync_tx = resync_tx.clone();
            Box::pin(async move {
                resync_tx.send(()).await?;
                Ok(())
            })
        }));
        Informer::new(lw, eh, rh)
    }

    fn create_stack_informer(config: &ControllerConfig, tx: mpsc::Sender<String>) -> Informer<Stack> {
        let lw = client::create_lister_watcher(config, "stacks".to_string());
        let tx_add = tx;
        let tx_update = tx_add.clone();
        let tx_delete = tx_add.clone();
        let eh = EventHandler::<Stack> {
            add_cls: Box::new(move |stack| {
                let tx_add = tx_add.clone();
                Box::pin(async move {
                    if let Some(owner) = owning_stackset(&stack) {
                        tx_add.send(owner).await?;
                    }
                    Ok(())
                })
            }),
            update_cls: Box::new(move |(_old, new)| {
                let tx_update = tx_update.clone();
                Box::pin(async move {
                    if let Some(owner) = owning_stackset(&new) {
                        tx_update.send(owner).await?;
                    }
                    Ok(())
                })
            }),
            delete_cls: Box::new(move |stack| {
                let tx_delete = tx_delete.clone();
                Box::pin(async move {
                    if let Some(owner) = owning_stackset(&stack) {
                        tx_delete.send(owner).await?;
                    }
                    Ok(())
                })
            }),
        };
        let rh = ResyncHandler(Box::new(move |()| Box::pin(async move { Ok(()) })));
        Informer::new(lw, eh, rh)
    }
}

fn owning_stackset(stack: &Stack) -> Option<String> {
    stack
        .metadata
        .owner_references
        .iter()
        .find(|owner| owner.kind == "StackSet")
        .map(|owner| stackset_key(&stack.metadata.namespace, &owner.name))
}

/// The work queue and informer stores key StackSets by namespace plus name:
/// StackSet names are only guaranteed unique within a namespace, and
/// `namespace` in `ControllerConfig` may be empty, meaning every namespace is
/// watched at once.
fn stackset_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
