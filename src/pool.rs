use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context};
use crossbeam_queue::ArrayQueue;

/// A finished job paired with its outcome.
pub type Outcome<J, R> = (J, anyhow::Result<R>);

/// Runs `work` over every job using up to `workers` threads.
///
/// Jobs are independent, so the order of the returned outcomes is unspecified. With
/// `fail_fast` set, workers stop taking new jobs after the first failure and the jobs never
/// started are not returned.
pub fn run<J, R, F>(
    jobs: Vec<J>,
    workers: usize,
    fail_fast: bool,
    work: F,
) -> anyhow::Result<Vec<Outcome<J, R>>>
where
    J: Send,
    R: Send,
    F: Fn(&J) -> anyhow::Result<R> + Sync,
{
    if jobs.is_empty() {
        return Ok(vec![]);
    }

    let workers = workers.clamp(1, jobs.len());

    if workers == 1 {
        let mut outcomes = Vec::with_capacity(jobs.len());

        for job in jobs {
            let result = work(&job);
            let failed = result.is_err();

            outcomes.push((job, result));

            if failed && fail_fast {
                break;
            }
        }

        return Ok(outcomes);
    }

    let job_queue: ArrayQueue<J> = ArrayQueue::new(jobs.len());
    let result_queue: ArrayQueue<Outcome<J, R>> = ArrayQueue::new(jobs.len());
    let abort = AtomicBool::new(false);

    for job in jobs {
        if job_queue.push(job).is_err() {
            return Err(anyhow!("Worker queue was unexpectedly full"));
        }
    }

    let job_queue = &job_queue;
    let result_queue_ref = &result_queue;
    let abort = &abort;
    let work = &work;

    std::thread::scope(|scope| -> anyhow::Result<()> {
        let threads = (0..workers)
            .map(move |_thread_index| {
                scope.spawn(move || -> anyhow::Result<()> {
                    while !abort.load(Ordering::Relaxed) {
                        let Some(job) = job_queue.pop() else {
                            break;
                        };

                        let result = work(&job);

                        if result.is_err() && fail_fast {
                            abort.store(true, Ordering::Relaxed);
                        }

                        if result_queue_ref.push((job, result)).is_err() {
                            return Err(anyhow!("Worker result queue was unexpectedly full"));
                        }
                    }

                    Ok(())
                })
            })
            .collect::<Vec<_>>();

        for thread in threads {
            match thread.join() {
                Ok(result) => {
                    result.context("Worker failed")?;
                }
                Err(error) => {
                    return Err(anyhow!("Worker panicked: {:?}", error));
                }
            }
        }

        Ok(())
    })
    .context("Unable to execute workers")?;

    let mut outcomes = Vec::with_capacity(result_queue.len());

    while let Some(outcome) = result_queue.pop() {
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn every_job_runs_exactly_once() {
        let calls = AtomicUsize::new(0);

        let mut outcomes = run((0..50).collect(), 4, false, |job: &usize| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(job * 2)
        })
        .unwrap();

        outcomes.sort_by_key(|(job, _result)| *job);

        assert_eq!(calls.load(Ordering::Relaxed), 50);
        assert_eq!(outcomes.len(), 50);
        assert!(outcomes
            .iter()
            .all(|(job, result)| result.as_ref().ok() == Some(&(job * 2))));
    }

    #[test]
    fn parallel_and_sequential_runs_agree() {
        let work = |job: &u32| -> anyhow::Result<u32> {
            if job % 7 == 0 {
                Err(anyhow!("job {job} failed"))
            } else {
                Ok(job * job)
            }
        };

        let summarize = |outcomes: Vec<Outcome<u32, u32>>| {
            let mut summary: Vec<_> = outcomes
                .into_iter()
                .map(|(job, result)| (job, result.ok()))
                .collect();
            summary.sort_unstable();
            summary
        };

        let sequential = summarize(run((0..40).collect(), 1, false, work).unwrap());
        let parallel = summarize(run((0..40).collect(), 8, false, work).unwrap());

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn sequential_fail_fast_stops_at_first_failure() {
        let outcomes = run(vec![1, 2, 3, 4], 1, true, |job: &u32| {
            if *job == 2 {
                Err(anyhow!("boom"))
            } else {
                Ok(())
            }
        })
        .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[1].1.is_err());
    }

    #[test]
    fn parallel_fail_fast_reports_the_failure() {
        let outcomes = run((0..100).collect(), 4, true, |job: &u32| {
            if *job == 0 {
                Err(anyhow!("boom"))
            } else {
                Ok(())
            }
        })
        .unwrap();

        assert!(outcomes.iter().any(|(job, result)| *job == 0 && result.is_err()));
        assert!(outcomes.len() <= 100);
    }

    #[test]
    fn empty_job_list_is_fine() {
        let outcomes = run(Vec::<u32>::new(), 4, true, |_job: &u32| Ok(())).unwrap();
        assert!(outcomes.is_empty());
    }
}
