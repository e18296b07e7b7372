use std::time::Duration;

use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Tick,
    Key(KeyEvent),
    Resize(u16, u16),
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    handler: Option<tokio::task::JoinHandle<()>>,
}

impl EventHandler {
    /// Read terminal events and emit a tick every `tick_rate`
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let handler = tokio::spawn(async move {
            let mut reader = EventStream::new();
            let mut tick = tokio::time::interval(tick_rate);

            loop {
                let tick_delay = tick.tick();
                let crossterm_event = reader.next().fuse();

                tokio::select! {
                    _ = tick_delay => {
                        if tx.send(Event::Tick).is_err() {
                            break;
                        }
                    }
                    event = crossterm_event => {
                        let event = match event {
                            Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => Event::Key(key),
                            Some(Ok(CrosstermEvent::Resize(w, h))) => Event::Resize(w, h),
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                warn!("Failed to read terminal event: {}", e);
                                break;
                            }
                            // Input closed, dropping the sender ends the dashboard
                            None => break,
                        };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            rx,
            handler: Some(handler),
        }
    }

    /// Events fed from a channel instead of the terminal
    pub fn from_channel(rx: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { rx, handler: None }
    }

    /// Clean up event handler by aborting the task
    pub fn shutdown(mut self) {
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
    }

    /// Next event, `None` once input has ended
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
