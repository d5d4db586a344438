//! Background send worker: offloads `(prefix, body, suffix)` writes to a
//! dedicated thread so a query that exceeds the server's receive buffer
//! cannot deadlock the client against its own blocking socket write.

use std::io::{Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

use crate::framer::BlockFramer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Sending,
    Shutdown,
}

struct Shared {
    state: Mutex<WorkerState>,
    query_available: Condvar,
    idle: Condvar,
}

struct PendingQuery {
    prefix: &'static str,
    body: String,
    suffix: &'static str,
}

/// Drives a `BlockFramer` from a background thread. Producers call
/// `submit`, which blocks until the worker is `Idle`, then returns
/// immediately; `get_errors` blocks until the worker returns to `Idle`
/// and surfaces any I/O error captured while sending.
pub struct SendWorker {
    shared: Arc<Shared>,
    job: Arc<Mutex<Option<PendingQuery>>>,
    last_error: Arc<Mutex<Option<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl SendWorker {
    pub fn spawn<T>(mut framer: BlockFramer<T>) -> Self
    where
        T: Read + Write + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(WorkerState::Idle),
            query_available: Condvar::new(),
            idle: Condvar::new(),
        });
        let job: Arc<Mutex<Option<PendingQuery>>> = Arc::new(Mutex::new(None));
        let last_error = Arc::new(Mutex::new(None));

        let thread_shared = shared.clone();
        let thread_job = job.clone();
        let thread_error = last_error.clone();

        let handle = std::thread::spawn(move || loop {
            let mut guard = thread_shared.state.lock().unwrap();
            while *guard == WorkerState::Idle {
                guard = thread_shared.query_available.wait(guard).unwrap();
            }
            if *guard == WorkerState::Shutdown {
                return;
            }
            drop(guard);

            let query = thread_job.lock().unwrap().take();
            if let Some(query) = query {
                let result = (|| -> MapiResult<()> {
                    framer.write(query.prefix.as_bytes())?;
                    framer.write(query.body.as_bytes())?;
                    framer.write(query.suffix.as_bytes())?;
                    framer.flush()?;
                    Ok(())
                })();
                if let Err(err) = result {
                    *thread_error.lock().unwrap() = Some(err.to_string());
                }
            }

            let mut guard = thread_shared.state.lock().unwrap();
            *guard = WorkerState::Idle;
            thread_shared.idle.notify_all();
        });

        SendWorker {
            shared,
            job,
            last_error,
            handle: Some(handle),
        }
    }

    /// Blocks until the worker is `Idle`, then hands it the next query and
    /// returns without waiting for the write to complete.
    pub fn submit(&self, prefix: &'static str, body: String, suffix: &'static str) {
        let mut guard = self.shared.state.lock().unwrap();
        while *guard == WorkerState::Sending {
            guard = self.shared.idle.wait(guard).unwrap();
        }
        if *guard == WorkerState::Shutdown {
            return;
        }
        *self.job.lock().unwrap() = Some(PendingQuery { prefix, body, suffix });
        *guard = WorkerState::Sending;
        self.shared.query_available.notify_all();
    }

    /// Blocks until the worker returns to `Idle`, returning the I/O error
    /// captured during the most recent send, if any.
    pub fn get_errors(&self) -> MapiResult<()> {
        let mut guard = self.shared.state.lock().unwrap();
        while *guard == WorkerState::Sending {
            guard = self.shared.idle.wait(guard).unwrap();
        }
        drop(guard);
        if let Some(message) = self.last_error.lock().unwrap().take() {
            return Err(MapiError::Io(std::io::Error::new(std::io::ErrorKind::Other, message)));
        }
        Ok(())
    }

    /// Idempotent: a second call is a no-op.
    pub fn shutdown(&mut self) {
        let mut guard = self.shared.state.lock().unwrap();
        if *guard == WorkerState::Shutdown {
            return;
        }
        *guard = WorkerState::Shutdown;
        self.shared.query_available.notify_all();
        drop(guard);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SendWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    #[derive(Default, Clone)]
    struct SharedPipe(StdArc<StdMutex<VecDeque<u8>>>);

    impl Read for SharedPipe {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let mut buf = self.0.lock().unwrap();
            let n = out.len().min(buf.len());
            for slot in out.iter_mut().take(n) {
                *slot = buf.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for SharedPipe {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn submit_then_get_errors_round_trips_with_no_error() {
        let pipe = SharedPipe::default();
        let framer = BlockFramer::new(pipe);
        let worker = SendWorker::spawn(framer);

        worker.submit("s", "select 1".to_string(), "\n;");
        worker.get_errors().unwrap();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let pipe = SharedPipe::default();
        let framer = BlockFramer::new(pipe);
        let mut worker = SendWorker::spawn(framer);
        worker.shutdown();
        worker.shutdown();
    }
}
