use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use crate::api::{run_session, Collaborators, FlashError, FlashRequest};
use crate::cancel::CancelToken;
use crate::operation::OperationEvent;

/// A session running on its own thread.
pub struct FlashWorker {
    handle: JoinHandle<Result<(), FlashError>>,
    events: Receiver<OperationEvent>,
    cancel: CancelToken,
}

/// Starts `request` on a dedicated thread.
///
/// Events arrive on [`FlashWorker::events`] in emission order; the channel
/// closes after the final `Completed` event.
pub fn spawn(request: FlashRequest, collaborators: Collaborators) -> io::Result<FlashWorker> {
    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let handle = thread::Builder::new()
        .name("flash-session".to_string())
        .spawn(move || {
            run_session(&request, collaborators, &token, |event| {
                // The host may stop listening; the session still runs to completion.
                let _ = tx.send(event);
            })
        })?;

    Ok(FlashWorker {
        handle,
        events: rx,
        cancel,
    })
}

impl FlashWorker {
    pub fn events(&self) -> &Receiver<OperationEvent> {
        &self.events
    }

    /// Asks the session to stop at the next chunk boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the session and returns its result.
    pub fn join(self) -> Result<(), FlashError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
