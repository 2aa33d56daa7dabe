//! Dispatch of independent check units to worker threads.
//!
//! Every worker pulls units from a shared queue and builds whatever solver
//! it needs itself; solver handles never cross threads. With one worker the
//! units run in order on the calling thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread;

use tracing::debug;

use crate::error::CheckError;

/// Run `run` on units until one reports `Some`. Unstarted units are
/// dropped once a result is in.
///
/// An error takes priority over a falsification: if any unit that ran
/// failed, the run fails, even when another unit running alongside it
/// reported `Some` first. Units never started because of an earlier
/// falsification cannot fail the run.
pub fn first_falsification<I, T, F>(units: I, workers: usize, run: F) -> Result<Option<T>, CheckError>
where
    I: IntoIterator,
    I::IntoIter: Send,
    T: Send,
    F: Fn(I::Item) -> Result<Option<T>, CheckError> + Sync,
{
    if workers <= 1 {
        for unit in units {
            if let Some(found) = run(unit)? {
                return Ok(Some(found));
            }
        }
        return Ok(None);
    }

    let queue = Mutex::new(units.into_iter());
    let stop = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel();
    thread::scope(|scope| {
        let (queue, stop, run) = (&queue, &stop, &run);
        for worker in 0..workers {
            let tx = tx.clone();
            scope.spawn(move || {
                let mut done = 0usize;
                while !stop.load(Ordering::Acquire) {
                    let next = queue.lock().ok().and_then(|mut q| q.next());
                    let Some(unit) = next else {
                        break;
                    };
                    done += 1;
                    match run(unit) {
                        Ok(None) => {}
                        outcome => {
                            stop.store(true, Ordering::Release);
                            let _ = tx.send(outcome);
                            break;
                        }
                    }
                }
                debug!(worker, units = done, "worker finished");
            });
        }
    });
    drop(tx);

    let mut first = None;
    let mut failure = None;
    for outcome in rx {
        match outcome {
            Err(e) => {
                failure.get_or_insert(e);
            }
            Ok(found) => {
                if first.is_none() {
                    first = found;
                }
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(first),
    }
}

/// Run `run` on every unit and return the outputs in unit order.
pub fn run_all<U, T, F>(units: Vec<U>, workers: usize, run: F) -> Result<Vec<T>, CheckError>
where
    U: Send,
    T: Send,
    F: Fn(U) -> Result<T, CheckError> + Sync,
{
    if workers <= 1 {
        return units.into_iter().map(run).collect();
    }

    let total = units.len();
    let queue = Mutex::new(units.into_iter().enumerate());
    let stop = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel();
    thread::scope(|scope| {
        let (queue, stop, run) = (&queue, &stop, &run);
        for _ in 0..workers.min(total) {
            let tx = tx.clone();
            scope.spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let next = queue.lock().ok().and_then(|mut q| q.next());
                    let Some((index, unit)) = next else {
                        break;
                    };
                    let outcome = run(unit);
                    if outcome.is_err() {
                        stop.store(true, Ordering::Release);
                    }
                    let _ = tx.send((index, outcome));
                }
            });
        }
    });
    drop(tx);

    let mut outputs: Vec<(usize, T)> = Vec::with_capacity(total);
    for (index, outcome) in rx {
        outputs.push((index, outcome?));
    }
    outputs.sort_by_key(|(index, _)| *index);
    Ok(outputs.into_iter().map(|(_, output)| output).collect())
}
