use crossbeam::channel::{unbounded, Receiver, Sender};
use std::thread::JoinHandle;
use tracing::warn;

/// A blocking job running on its own thread that reports its incremental
/// results over a channel. The thread that created the worker keeps the
/// receiving end and decides what to do with each result.
pub struct Worker<T> {
    name: String,
    events: Receiver<T>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F>(name: &str, job: F) -> std::io::Result<Worker<T>>
    where
        F: FnOnce(Sender<T>) + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || job(tx))?;
        Ok(Worker {
            name: name.to_string(),
            events: rx,
            handle: Some(handle),
        })
    }

    pub fn events(&self) -> &Receiver<T> {
        &self.events
    }

    /// Waits for the job to return. Results that were not consumed yet stay
    /// available on [`Worker::events`].
    pub fn join(&mut self) {
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                warn!("worker thread `{}` panicked", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_arrive_in_order_and_channel_closes() {
        let mut w = Worker::spawn("counter", |tx| {
            for i in 0..5u32 {
                tx.send(i).unwrap();
            }
        })
        .unwrap();
        let got: Vec<u32> = w.events().iter().collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        w.join();
    }
}
