//! Chain execution.
//!
//! Simultaneous chains start every element, wait for the head and close
//! everything. Sequential chains run one stage at a time, handing off at
//! each mediator:
//!
//! ```text
//! S0 M1 S1 M2 S2
//!
//! at M1: start S0,           join S0,                close S0
//! at M2: start S1, start M1, join S1, interrupt M1,  close S1
//! tail:  start S2, start M2, join S2, interrupt M2
//! then:  close M1, M2, S2
//! ```
//!
//! Every join is bounded by the run timeout, and every element is closed
//! exactly once whatever failed on the way.

use super::{Chain, ChainElement, ChainMode};
use crate::context::RunContext;
use crate::logging::marker;
use loadchain_shared::errors::LoadchainResult;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct ChainExecutor {
    ctx: Arc<RunContext>,
}

impl ChainExecutor {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    /// Run the chain to completion or timeout, then release every element.
    ///
    /// Failures are logged, never returned: one misbehaving element must not
    /// keep the rest of the chain from being closed.
    pub async fn execute(&self, chain: &Chain, simultaneous: bool) {
        let mode = ChainMode::from_simultaneous(simultaneous);
        let timeout = self.ctx.timeout.as_duration();
        let started = Instant::now();

        tracing::info!(
            marker = marker::MSG,
            run = %self.ctx.run_name,
            run_id = %self.ctx.run_id,
            mode = %mode,
            elements = chain.len(),
            timeout = %self.ctx.timeout,
            "Executing chain"
        );

        let mut closed = vec![false; chain.len()];
        match mode {
            ChainMode::Simultaneous => self.run_simultaneous(chain, timeout).await,
            ChainMode::Sequential => self.run_sequential(chain, timeout, &mut closed).await,
        }

        for (element, _) in chain.iter().zip(&closed).filter(|(_, done)| !**done) {
            close_element(element).await;
        }

        tracing::info!(
            marker = marker::MSG,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chain execution finished"
        );
    }

    async fn run_simultaneous(&self, chain: &Chain, timeout: Duration) {
        for element in chain {
            if let Err(e) = start_element(element).await {
                tracing::error!(
                    marker = marker::ERR,
                    element = %element.name(),
                    error = %e,
                    "Failed to start chain element"
                );
            }
        }

        let Some(head) = chain.first() else {
            tracing::error!(marker = marker::ERR, "No 1st element in the chain");
            return;
        };

        if let Err(e) = join_element(head, timeout).await {
            tracing::error!(
                marker = marker::ERR,
                element = %head.name(),
                error = %e,
                "Chain execution failure"
            );
        }
    }

    async fn run_sequential(&self, chain: &Chain, timeout: Duration, closed: &mut [bool]) {
        let mut pending: Option<(usize, &ChainElement)> = None;
        let mut previous_mediator: Option<&ChainElement> = None;

        for (index, element) in chain.iter().enumerate() {
            match element {
                ChainElement::Stage(_) => pending = Some((index, element)),
                ChainElement::Mediator(_) => {
                    if let Some((stage_index, stage)) = pending.take() {
                        hand_off(stage, previous_mediator, timeout).await;
                        close_element(stage).await;
                        closed[stage_index] = true;
                    }
                    previous_mediator = Some(element);
                }
            }
        }

        // The last stage has no mediator after it; it is closed with the rest
        if let Some((_, stage)) = pending {
            hand_off(stage, previous_mediator, timeout).await;
        }
    }
}

/// Run `stage` fed by `upstream`, then stop `upstream`.
async fn hand_off(stage: &ChainElement, upstream: Option<&ChainElement>, timeout: Duration) {
    let result: LoadchainResult<()> = async {
        start_element(stage).await?;
        if let Some(mediator) = upstream {
            start_element(mediator).await?;
        }
        join_element(stage, timeout).await?;
        if let Some(mediator) = upstream {
            mediator.element().interrupt().await?;
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        tracing::error!(
            marker = marker::ERR,
            stage = %stage.name(),
            upstream = upstream.map(ChainElement::name).unwrap_or("none"),
            error = %e,
            "Chain execution failure"
        );
    }
}

async fn start_element(element: &ChainElement) -> LoadchainResult<()> {
    element.element().start().await?;
    tracing::info!(marker = marker::MSG, element = %element.name(), "Chain element started");
    Ok(())
}

/// Bounded join, logging whether the element finished or timed out.
async fn join_element(element: &ChainElement, timeout: Duration) -> LoadchainResult<bool> {
    let started = Instant::now();
    let finished = element.element().join(timeout).await?;
    let waited_ms = started.elapsed().as_millis() as u64;

    if finished {
        tracing::info!(marker = marker::MSG, element = %element.name(), waited_ms, "Chain element finished");
    } else {
        tracing::info!(
            marker = marker::MSG,
            element = %element.name(),
            waited_ms,
            "Chain element timed out"
        );
    }
    Ok(finished)
}

async fn close_element(element: &ChainElement) {
    if let Err(e) = element.element().close().await {
        tracing::warn!(
            marker = marker::ERR,
            element = %element.name(),
            error = %e,
            "Chain element closing failure"
        );
    }
}
