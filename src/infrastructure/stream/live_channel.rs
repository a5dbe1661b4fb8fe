#[cfg(test)]
#[path = "live_channel_test.rs"]
mod tests;

use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::domain::models::Event;
use crate::domain::models::StreamMessage;

/// Opens the streaming connection for a single session. The channel never
/// reconnects on its own: once it reports `StreamDisconnected` the owner has to
/// open a new one.
pub struct LiveChannel {}

/// Owns the running connection. Closing or dropping the handle tears the
/// socket down.
pub struct LiveChannelHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveChannelHandle {
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Closes the connection and waits for the close frame to go out.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = ?err, "Live channel task ended abnormally");
            }
        }
    }
}

impl Drop for LiveChannelHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn forward(text: &str, tx: &mpsc::UnboundedSender<Event>) -> bool {
    let message = match serde_json::from_str::<StreamMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(error = ?err, "Skipping malformed stream frame");
            return true;
        }
    };

    if message == StreamMessage::Unknown {
        tracing::debug!(frame = text, "Skipping unknown stream frame");
        return true;
    }

    return tx.send(Event::Stream(message)).is_ok();
}

async fn run(url: String, tx: mpsc::UnboundedSender<Event>, cancel: CancellationToken) {
    let connect = tokio::select! {
        _ = cancel.cancelled() => return,
        res = connect_async(url.as_str()) => res,
    };

    let ws = match connect {
        Ok((ws, _)) => ws,
        Err(err) => {
            tracing::error!(error = ?err, url = %url, "Live channel failed to connect");
            let _ = tx.send(Event::StreamDisconnected());
            return;
        }
    };

    tracing::info!(url = %url, "Live channel connected");
    if tx.send(Event::StreamConnected()).is_err() {
        return;
    }

    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(err) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = ?err, "Live channel already closed");
                }
                break;
            }
            frame = read.next() => {
                let keep_going = match frame {
                    Some(Ok(Message::Text(text))) => forward(&text, &tx),
                    Some(Ok(Message::Binary(bytes))) => forward(&String::from_utf8_lossy(&bytes), &tx),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Live channel closed by server");
                        false
                    }
                    Some(Ok(_)) => true,
                    Some(Err(err)) => {
                        tracing::error!(error = ?err, "Live channel transport error");
                        false
                    }
                    None => false,
                };

                if !keep_going {
                    break;
                }
            }
        }
    }

    tracing::info!(url = %url, "Live channel disconnected");
    let _ = tx.send(Event::StreamDisconnected());
}

impl LiveChannel {
    /// Spawns the connection task. Must be called from within a tokio runtime.
    pub fn open(url: &str, tx: mpsc::UnboundedSender<Event>) -> LiveChannelHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(url.to_string(), tx, cancel.clone()));

        return LiveChannelHandle {
            cancel,
            task: Some(task),
        };
    }
}
