//! Watermark scheduler
//!
//! A [`PollRun`] covers the time between the stored watermark and now with
//! consecutive windows, polls them strictly in order and forwards every
//! indicator as soon as it is decoded. After each completed window the
//! watermark moves up to the newest content timestamp that window
//! delivered. The updated [`PollState`] is only handed back by
//! [`PollRun::finish`], once the caller is done with the indicators.

use std::collections::VecDeque;
use tracing::{error, info};

use stixpoll_core::timestamp::{self, Precision};
use stixpoll_core::Indicator;
use stixpoll_net::{TaxiiError, TimeWindow};

use crate::checkpoint::PollState;
use crate::source::{PollSource, WindowPoll};
use crate::window::{plan_run, run_begin};

/// Window sizing, all spans in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub max_window: i64,
    pub initial_lookback: i64,
    /// Truncate window bounds to whole minutes
    pub lower_precision: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_window: 86_400_000,
            initial_lookback: 86_400_000,
            lower_precision: false,
        }
    }
}

/// One invocation of a source, as a pull sequence of indicators
pub struct PollRun<S: PollSource> {
    source: S,
    windows: VecDeque<TimeWindow>,
    current: Option<(TimeWindow, S::Poll)>,
    state: PollState,
    completed: usize,
    failed: bool,
}

impl<S: PollSource> PollRun<S> {
    pub fn new(source: S, state: PollState, now: i64, settings: &RunSettings) -> Self {
        let begin = run_begin(state.watermark, now, settings.initial_lookback);
        let windows: VecDeque<TimeWindow> =
            plan_run(begin, now, settings.max_window, settings.lower_precision).into();

        info!(
            "{}: {} window(s) from {}",
            source.name(),
            windows.len(),
            timestamp::format(begin, Precision::Seconds)
        );

        Self {
            source,
            windows,
            current: None,
            state,
            completed: 0,
            failed: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Windows fully polled so far
    pub fn windows_completed(&self) -> usize {
        self.completed
    }

    /// Windows not yet started
    pub fn windows_remaining(&self) -> usize {
        self.windows.len()
    }

    /// Next indicator, `None` when every window is done
    ///
    /// The first error ends the run: the failing window and the ones after
    /// it are left for the next run, which starts from the watermark of the
    /// windows completed before it.
    pub async fn next(&mut self) -> Result<Option<Indicator>, TaxiiError> {
        loop {
            if self.failed {
                return Ok(None);
            }

            if let Some((window, poll)) = &mut self.current {
                let window = *window;
                match poll.next().await {
                    Ok(Some(indicator)) => return Ok(Some(indicator)),
                    Ok(None) => {
                        let observed = poll.max_content_timestamp();
                        self.current = None;
                        self.complete(window, observed);
                    }
                    Err(e) => {
                        self.current = None;
                        return Err(self.abort(window, e));
                    }
                }
                continue;
            }

            // popped only once open, so a dropped open leaves the window queued
            let Some(&window) = self.windows.front() else {
                return Ok(None);
            };
            info!(
                "{}: polling ({}, {}]",
                self.source.name(),
                timestamp::format(window.begin(), Precision::Seconds),
                timestamp::format(window.end(), Precision::Seconds)
            );
            match self.source.open(window).await {
                Ok(poll) => {
                    self.windows.pop_front();
                    self.current = Some((window, poll));
                }
                Err(e) => return Err(self.abort(window, e)),
            }
        }
    }

    /// End the run and return the state to persist
    pub fn finish(self) -> PollState {
        if !self.windows.is_empty() || self.current.is_some() {
            info!(
                "{}: run ended with {} window(s) not polled",
                self.source.name(),
                self.windows.len() + usize::from(self.current.is_some())
            );
        }
        self.state
    }

    fn complete(&mut self, window: TimeWindow, observed: Option<i64>) {
        self.state = self.state.advance(observed);
        self.completed += 1;
        info!(
            "{}: window ending {} done, watermark {}",
            self.source.name(),
            timestamp::format(window.end(), Precision::Seconds),
            self.state
                .watermark
                .map(|w| timestamp::format(w, Precision::Millis))
                .unwrap_or_else(|| "unset".to_string())
        );
    }

    fn abort(&mut self, window: TimeWindow, e: TaxiiError) -> TaxiiError {
        error!(
            "{}: window starting {} failed ({}retryable): {}",
            self.source.name(),
            timestamp::format(window.begin(), Precision::Seconds),
            if e.is_retryable() { "" } else { "not " },
            e
        );
        self.failed = true;
        self.windows.clear();
        e
    }
}
