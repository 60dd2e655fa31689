use crate::api::FlashError;
use crate::boot_sequence::{has_exit_sequence, BootSequencer};
use crate::operation::OperationEvent;
use crate::port::Port;
use crate::session::Session;

fn record(result: &mut Result<(), FlashError>, err: FlashError) {
    if result.is_ok() {
        *result = Err(err);
    }
}

impl Session {
    /// Leaves the target in its final state and releases every handle.
    ///
    /// Consumes the session, so it runs exactly once. Returns the first
    /// failure among the operation itself, the resume and the reset.
    pub fn finalize<F>(
        mut self,
        result: Result<(), FlashError>,
        on_event: &mut F,
    ) -> Result<(), FlashError>
    where
        F: FnMut(OperationEvent),
    {
        let mut result = result;
        let mut reset = self.reset && !self.self_reset;
        let sequence = self.boot_sequence.as_deref();

        match (self.bootloader.as_deref_mut(), self.port.as_deref_mut()) {
            (Some(bootloader), Some(port)) => {
                if result.is_ok() && self.execute && !self.self_reset {
                    let addr = self
                        .exec_addr
                        .unwrap_or(bootloader.info().memory.flash_start);
                    tracing::info!(addr, "starting execution");
                    match bootloader.go(port, addr) {
                        Ok(()) => {
                            reset = false;
                            on_event(OperationEvent::Resume { addr, ok: true });
                        }
                        Err(source) => {
                            tracing::warn!(addr, error = %source, "failed to start execution");
                            on_event(OperationEvent::Resume { addr, ok: false });
                            record(&mut result, FlashError::Resume { addr, source });
                        }
                    }
                }

                if reset {
                    tracing::info!("resetting device");
                    match self.sequencer.exit(bootloader, port, sequence) {
                        Ok(()) => on_event(OperationEvent::Reset { ok: true }),
                        Err(source) => {
                            tracing::warn!(error = %source, "reset failed");
                            on_event(OperationEvent::Reset { ok: false });
                            record(&mut result, FlashError::Reset { source });
                        }
                    }
                } else {
                    run_exit_sequence(self.sequencer.as_mut(), port, sequence, on_event);
                }
            }
            (None, Some(port)) => {
                run_exit_sequence(self.sequencer.as_mut(), port, sequence, on_event)
            }
            _ => {}
        }

        self.release();

        let message = result.as_ref().err().map(|e| e.to_string());
        on_event(OperationEvent::Completed {
            ok: result.is_ok(),
            message,
        });
        result
    }
}

/// Best effort: failures are reported but never change the outcome.
fn run_exit_sequence<F>(
    sequencer: &mut dyn BootSequencer,
    port: &mut dyn Port,
    sequence: Option<&str>,
    on_event: &mut F,
) where
    F: FnMut(OperationEvent),
{
    let Some(sequence) = sequence.filter(|s| has_exit_sequence(Some(*s))) else {
        return;
    };
    let ok = match sequencer.run_exit_sequence(port, sequence) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "exit sequence failed");
            false
        }
    };
    on_event(OperationEvent::ExitSequence { ok });
}

#[cfg(test)]
mod tests {
    use crate::api::{run_session, FlashError, FlashRequest};
    use crate::cancel::CancelToken;
    use crate::memory_map::tests::uniform_map;
    use crate::mock::{Call, MockSetup};
    use crate::operation::{Action, OperationEvent};

    fn run(
        setup: MockSetup,
        request: &FlashRequest,
    ) -> (Result<(), FlashError>, Vec<OperationEvent>, Vec<Call>) {
        let (collaborators, log) = setup.build();
        let mut events = Vec::new();
        let r = run_session(request, collaborators, &CancelToken::new(), |e| events.push(e));
        let calls = log.lock().unwrap().clone();
        (r, events, calls)
    }

    fn crc_request() -> FlashRequest {
        let mut r = FlashRequest::new(Action::Crc, "unused");
        r.options.port_open_delay_ms = 1;
        r
    }

    #[test]
    fn resume_uses_explicit_address() {
        let mut req = crc_request();
        req.options.execute = true;
        req.options.exec_addr = Some(0x0800_0400);
        let (r, events, calls) = run(MockSetup::new(uniform_map(1024, 4)), &req);
        r.unwrap();
        assert!(calls.contains(&Call::Go { addr: 0x0800_0400 }));
        assert!(events.contains(&OperationEvent::Resume {
            addr: 0x0800_0400,
            ok: true
        }));
    }

    #[test]
    fn failed_resume_falls_through_to_reset() {
        let mut req = crc_request();
        req.options.execute = true;
        req.options.reset = true;
        let (r, events, calls) = run(MockSetup::new(uniform_map(1024, 4)).fail_go(), &req);
        assert!(matches!(r.unwrap_err(), FlashError::Resume { .. }));
        assert!(calls.contains(&Call::SequencerExit));
        assert!(events.contains(&OperationEvent::Reset { ok: true }));
    }

    #[test]
    fn reset_failure_fails_the_session() {
        let mut req = crc_request();
        req.options.reset = true;
        let (r, events, _calls) = run(MockSetup::new(uniform_map(1024, 4)).fail_exit(), &req);
        assert!(matches!(r.unwrap_err(), FlashError::Reset { .. }));
        assert!(matches!(
            events.last(),
            Some(OperationEvent::Completed { ok: false, .. })
        ));
    }

    #[test]
    fn operation_error_wins_over_reset_error() {
        let mut req = crc_request();
        req.options.reset = true;
        let setup = MockSetup::new(uniform_map(1024, 4)).fail_exit().fail_crc();
        let (r, _events, _calls) = run(setup, &req);
        assert!(matches!(r.unwrap_err(), FlashError::Crc { .. }));
    }

    #[test]
    fn exit_sequence_failure_is_ignored() {
        let mut req = crc_request();
        req.options.boot_sequence = Some("rts:-rts".to_string());
        let (r, events, _calls) = run(MockSetup::new(uniform_map(1024, 4)).fail_exit(), &req);
        r.unwrap();
        assert!(events.contains(&OperationEvent::ExitSequence { ok: false }));
        assert!(events.contains(&OperationEvent::Completed {
            ok: true,
            message: None
        }));
    }

    #[test]
    fn exit_sequence_runs_without_bootloader() {
        let mut req = crc_request();
        req.options.boot_sequence = Some("rts:-rts".to_string());
        let (r, _events, calls) = run(MockSetup::new(uniform_map(1024, 4)).fail_connect(), &req);
        assert!(matches!(r.unwrap_err(), FlashError::Connect { .. }));
        assert!(calls.contains(&Call::SequencerExitOnly));
        assert!(!calls.contains(&Call::BootloaderClose));
        assert!(calls.contains(&Call::PortClose));
    }

    #[test]
    fn no_exit_sequence_without_delimiter() {
        let mut req = crc_request();
        req.options.boot_sequence = Some("rts,-dtr".to_string());
        let (r, _events, calls) = run(MockSetup::new(uniform_map(1024, 4)), &req);
        r.unwrap();
        assert!(!calls.contains(&Call::SequencerExitOnly));
    }
}
