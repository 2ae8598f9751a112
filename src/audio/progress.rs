//! Progress ticker for the active track.
//!
//! A [`ProgressReporter`] is an independent tokio task owned by the session.
//! It publishes a [`ProgressUpdate`] every interval, a final update at the end
//! of the track and two trailing updates (`Finished`, `Faded`) before exiting.
//! Once [`ProgressReporter::cancel`] returns nothing else is published.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUpdate {
    Tick { elapsed: u64, total: u64 },
    Finished { total: u64 },
    Faded,
}

pub type PublishFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct ProgressSettings {
    pub interval: Duration,
    /// Por encima de este número de reproducciones solo se publica el final
    pub suppress_after: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            suppress_after: 30,
        }
    }
}

pub struct ProgressReporter {
    cancel: CancellationToken,
    // Compuerta de publicación: cerrada por cancel() bajo el mismo lock que usa la tarea
    open: Arc<Mutex<bool>>,
    paused: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(
        total_secs: u64,
        usage_count: u64,
        settings: ProgressSettings,
        publish: PublishFn,
    ) -> Self {
        let cancel = CancellationToken::new();
        let open = Arc::new(Mutex::new(true));
        let (paused, paused_rx) = watch::channel(false);
        let suppressed = usage_count > settings.suppress_after;

        let task = tokio::spawn(run(
            total_secs,
            settings.interval,
            suppressed,
            cancel.clone(),
            open.clone(),
            paused_rx,
            publish,
        ));

        Self {
            cancel,
            open,
            paused,
            task,
        }
    }

    pub fn pause(&self) {
        let _ = self.paused.send(true);
    }

    pub fn resume(&self) {
        let _ = self.paused.send(false);
    }

    /// Detiene el ticker; al volver ya no habrá más publicaciones
    pub fn cancel(&self) {
        *self.open.lock() = false;
        self.cancel.cancel();
        self.task.abort();
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run(
    total: u64,
    interval: Duration,
    suppressed: bool,
    cancel: CancellationToken,
    open: Arc<Mutex<bool>>,
    mut paused: watch::Receiver<bool>,
    publish: PublishFn,
) {
    let emit = |update: ProgressUpdate| {
        let open = open.lock();
        if *open {
            publish(update);
        }
    };
    let length = Duration::from_secs(total);
    let step = Duration::from_secs(interval.as_secs().max(1));

    if !suppressed {
        emit(ProgressUpdate::Tick { elapsed: 0, total });
    }

    let mut played = Duration::ZERO;
    let mut next_mark = step.min(length);
    while played < length {
        // El reloj no avanza mientras la sesión está en pausa
        while *paused.borrow_and_update() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        let remaining = next_mark - played;
        let started = Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = paused.changed() => {
                if changed.is_err() {
                    return;
                }
                // Solo cuenta lo que sonó antes de la pausa
                played += started.elapsed().min(remaining);
                continue;
            }
            _ = tokio::time::sleep(remaining) => {}
        }
        played = next_mark;
        next_mark = (next_mark + step).min(length);

        if played == length || !suppressed {
            emit(ProgressUpdate::Tick {
                elapsed: played.as_secs(),
                total,
            });
        }
    }

    emit(ProgressUpdate::Finished { total });

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(interval) => {}
    }
    emit(ProgressUpdate::Faded);
    debug!("Progreso terminado ({}s)", total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collector() -> (PublishFn, Arc<Mutex<Vec<ProgressUpdate>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let publish: PublishFn = Arc::new(move |update| sink.lock().push(update));
        (publish, seen)
    }

    fn tick(elapsed: u64, total: u64) -> ProgressUpdate {
        ProgressUpdate::Tick { elapsed, total }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_every_interval_then_trailing_updates() {
        let (publish, seen) = collector();
        let reporter = ProgressReporter::spawn(25, 1, ProgressSettings::default(), publish);

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(
            *seen.lock(),
            vec![
                tick(0, 25),
                tick(10, 25),
                tick(20, 25),
                tick(25, 25),
                ProgressUpdate::Finished { total: 25 },
                ProgressUpdate::Faded,
            ]
        );
        assert!(reporter.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn high_usage_suppresses_periodic_ticks() {
        let (publish, seen) = collector();
        let _reporter = ProgressReporter::spawn(25, 31, ProgressSettings::default(), publish);

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(
            *seen.lock(),
            vec![
                tick(25, 25),
                ProgressUpdate::Finished { total: 25 },
                ProgressUpdate::Faded,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_published_after_cancel() {
        let (publish, seen) = collector();
        let reporter = ProgressReporter::spawn(100, 1, ProgressSettings::default(), publish);

        tokio::time::sleep(Duration::from_secs(15)).await;
        reporter.cancel();
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(*seen.lock(), vec![tick(0, 100), tick(10, 100)]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_the_clock() {
        let (publish, seen) = collector();
        let reporter = ProgressReporter::spawn(30, 1, ProgressSettings::default(), publish);

        tokio::time::sleep(Duration::from_secs(5)).await;
        reporter.pause();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(*seen.lock(), vec![tick(0, 30)]);

        // Reanudado en t=105 con 5s reproducidos: 10s en t=110, 20s en t=120
        reporter.resume();
        tokio::time::sleep(Duration::from_secs(24)).await;
        assert_eq!(*seen.lock(), vec![tick(0, 30), tick(10, 30), tick(20, 30)]);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(
            *seen.lock(),
            vec![
                tick(0, 30),
                tick(10, 30),
                tick(20, 30),
                tick(30, 30),
                ProgressUpdate::Finished { total: 30 },
                ProgressUpdate::Faded,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_pauses_add_up_played_time() {
        let (publish, seen) = collector();
        let reporter = ProgressReporter::spawn(30, 1, ProgressSettings::default(), publish);

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            reporter.pause();
            tokio::time::sleep(Duration::from_secs(50)).await;
            reporter.resume();
        }
        // 9s reproducidos; falta 1s para la marca de 10s
        assert_eq!(*seen.lock(), vec![tick(0, 30)]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*seen.lock(), vec![tick(0, 30), tick(10, 30)]);
    }
}
