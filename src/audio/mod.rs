pub mod chirp;

use chirp::SuccessChirp;

use log::warn;
use rodio::{OutputStream, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

enum ChimeCommand {
    Play,
}

/// Plays the scan-success chirp. Audio is strictly best-effort: every
/// failure is logged and swallowed so a machine without an output device
/// never affects scanning.
#[derive(Clone)]
pub struct ChimeHandle {
    tx: Arc<Mutex<Option<Sender<ChimeCommand>>>>,
}

impl ChimeHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<ChimeCommand>, String> {
        if let Some(tx) = self.tx.lock().map_err(|e| e.to_string())?.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<ChimeCommand>();

        // Dedicated audio thread holding the non-Send output objects
        thread::Builder::new()
            .name("chime".to_string())
            .spawn(move || {
                let mut output: Option<(OutputStream, Sink)> = None;

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        ChimeCommand::Play => {
                            if output.is_none() {
                                match OutputStream::try_default() {
                                    Ok((stream, handle)) => match Sink::try_new(&handle) {
                                        Ok(sink) => output = Some((stream, sink)),
                                        Err(err) => {
                                            warn!("chime sink unavailable: {err}");
                                            continue;
                                        }
                                    },
                                    Err(err) => {
                                        warn!("audio output unavailable: {err}");
                                        continue;
                                    }
                                }
                            }

                            if let Some((_, sink)) = output.as_ref() {
                                sink.append(SuccessChirp::new());
                            }
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        let tx_clone = tx.clone();
        *self.tx.lock().map_err(|e| e.to_string())? = Some(tx);
        Ok(tx_clone)
    }

    /// Queues one chirp. Never fails from the caller's point of view.
    pub fn play(&self) {
        match self.ensure_thread() {
            Ok(tx) => {
                if tx.send(ChimeCommand::Play).is_err() {
                    warn!("chime thread is gone, success tone skipped");
                }
            }
            Err(err) => warn!("could not start chime thread: {err}"),
        }
    }
}
