use std::io;
use std::io::Read;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::info;
use log::warn;

use crate::classifier::Classifier;
use crate::classifier::PlaybackEvent;
use crate::client::watch_client_exit;
use crate::client::StreamingClient;
use crate::config;
use crate::config_file::ConfigFile;
use crate::recording::AudioRouting;
use crate::recording::FfmpegEncoder;
use crate::recording::PulseRouting;
use crate::recording::SessionController;
use crate::shutdown::Shutdown;
use crate::shutdown::ShutdownReason;
use crate::shutdown::Teardown;
use crate::shutdown::TeardownStep;
use crate::terminal::spawn_input_forwarder;
use crate::terminal::RawModeGuard;
use crate::transcript::ReaderEnd;
use crate::transcript::TranscriptReader;

/// Feeds every classified line to `handle` until the transcript ends, then
/// reports why it ended.
fn pump_transcript<R: Read>(
    mut reader: TranscriptReader<R>,
    classifier: &Classifier,
    mut handle: impl FnMut(PlaybackEvent),
    shutdown: &Shutdown,
) {
    for line in &mut reader {
        debug!("client: {}", line);
        for event in classifier.classify(&line) {
            debug!("{:?}", event);
            handle(event);
        }
    }
    match reader.into_end() {
        Some(ReaderEnd::Cancelled) => {}
        Some(ReaderEnd::Failed(e)) => shutdown.trigger(ShutdownReason::TranscriptFailed(e.to_string())),
        Some(ReaderEnd::Closed) | None => {
            // The terminal closes when the client exits. Give the exit
            // watcher a chance to report the exit status first.
            if !shutdown.sleep(config::CLIENT_REAP_TIMEOUT) {
                shutdown.trigger(ShutdownReason::TranscriptClosed);
            }
        }
    }
}

pub fn run(config_file: &ConfigFile) -> Result<ShutdownReason> {
    let quit_key = config_file.quit_key_byte()?;
    let routing = Arc::new(
        PulseRouting::acquire(config_file.source.as_deref())
            .context("Failed to determine audio source")?,
    );
    info!("Recording from {}", routing.source());
    let classifier = Classifier::new()?;
    let controller = SessionController::new(
        config_file.capture_settings(),
        Box::new(FfmpegEncoder::new(config_file.encoder.clone())),
        routing.clone(),
    );

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger(ShutdownReason::Signal))
            .context("Error setting Ctrl-C handler")?;
    }

    let (client, client_io) = StreamingClient::spawn(&config_file.client)?;
    let client = Arc::new(client);
    let raw_mode = match RawModeGuard::enable() {
        Ok(guard) => guard.map(Arc::new),
        Err(e) => {
            warn!("{:#}", e);
            None
        }
    };

    // Recording stops before the client goes away, so the tail of the
    // transcript can never start a new session.
    let teardown = Teardown::new(vec![
        TeardownStep::new("stop recording", {
            let controller = controller.clone();
            move || {
                controller.close();
                Ok(())
            }
        }),
        TeardownStep::new("terminate client", {
            let client = client.clone();
            move || client.terminate(config::CLIENT_TERMINATE_GRACE, config::CLIENT_REAP_TIMEOUT)
        }),
        TeardownStep::new("restore terminal", {
            let raw_mode = raw_mode.clone();
            move || match raw_mode {
                Some(guard) => guard.restore(),
                None => Ok(()),
            }
        }),
        TeardownStep::new("release audio routing", {
            let routing = routing.clone();
            move || routing.release()
        }),
    ]);

    {
        let client = client.clone();
        let shutdown = shutdown.clone();
        thread::spawn(move || watch_client_exit(&client, &shutdown));
    }
    let forwarder = spawn_input_forwarder(client_io.input, quit_key, shutdown.clone());
    {
        let controller = controller.clone();
        let shutdown = shutdown.clone();
        let reader = TranscriptReader::new(
            client_io.output,
            Some(Box::new(io::stdout())),
            shutdown.clone(),
        );
        thread::spawn(move || {
            pump_transcript(
                reader,
                &classifier,
                |event| controller.handle_event(event),
                &shutdown,
            )
        });
    }

    let reason = shutdown.wait();
    if let Some(path) = controller.recording_path() {
        info!("Discarding unfinished recording {:?}", path);
    }
    teardown.run();
    if forwarder.join().is_err() {
        warn!("Input forwarder panicked");
    }
    Ok(reason)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;
    use crate::recording::Progress;
    use crate::song::Track;

    fn pump(transcript: &str, shutdown: &Shutdown) -> Vec<PlaybackEvent> {
        let classifier = Classifier::new().unwrap();
        let reader = TranscriptReader::new(
            Cursor::new(transcript.as_bytes().to_vec()),
            None,
            shutdown.clone(),
        );
        let mut events = vec![];
        pump_transcript(reader, &classifier, |event| events.push(event), shutdown);
        events
    }

    #[test]
    fn test_transcript_becomes_events() {
        let shutdown = Shutdown::new();
        let transcript = "\x1b[2K|>  Station \"A\" (123)\r\n\
            \x1b[2K|>  \"Song1\" by \"Artist1\" on \"Album\"\r\n\
            \x1b[2K#   -00:05/03:00\r\x1b[2K#   -00:00/03:00\r\n\
            Welcome to the shell\n";
        let events = pump(transcript, &shutdown);
        assert_eq!(
            events,
            vec![
                PlaybackEvent::StationChanged { name: "A".into() },
                PlaybackEvent::TrackAnnounced(Track::new("Song1", "Artist1", Some("Album"))),
                PlaybackEvent::ProgressTick(Progress::new(
                    Duration::from_secs(5),
                    Duration::from_secs(180)
                )),
                PlaybackEvent::ProgressTick(Progress::new(
                    Duration::from_secs(0),
                    Duration::from_secs(180)
                )),
            ]
        );
        assert_eq!(shutdown.reason(), Some(ShutdownReason::TranscriptClosed));
    }

    #[test]
    fn test_closed_transcript_keeps_earlier_reason() {
        let shutdown = Shutdown::new();
        shutdown.trigger(ShutdownReason::ClientExited { success: false });
        let events = pump("|>  \"Song1\" by \"Artist1\"\n", &shutdown);
        assert!(events.is_empty());
        assert_eq!(
            shutdown.reason(),
            Some(ShutdownReason::ClientExited { success: false })
        );
    }
}
