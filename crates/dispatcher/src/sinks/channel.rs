//! ChannelSink - forwards events to an in-process consumer

use contracts::{CaptureEvent, ContractError, DataSink};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

/// Sink that hands every event to a tokio channel
///
/// The worker waits for room in the channel, so a slow consumer backs up the
/// sink's own queue and is dropped there instead of blocking capture.
pub struct ChannelSink {
    name: String,
    tx: mpsc::Sender<CaptureEvent>,
}

impl ChannelSink {
    /// Create the sink and the receiving end
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<CaptureEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

impl DataSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "channel_sink_write",
        skip(self, event),
        fields(sink = %self.name, kind = event.kind())
    )]
    async fn write(&mut self, event: &CaptureEvent) -> Result<(), ContractError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| ContractError::SinkClosed {
                sink_name: self.name.clone(),
            })
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "ChannelSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{MotionEvent, MotionSample};

    fn motion(timestamp: f64) -> CaptureEvent {
        CaptureEvent::Motion(MotionEvent {
            timestamp,
            timestamp_s: timestamp / 1000.0,
            gyro: MotionSample::gyro(0.0, 0.0, 0.0),
            accel: MotionSample::accel(0.0, 0.0, 9.81),
        })
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (mut sink, mut rx) = ChannelSink::new("chan", 4);
        sink.write(&motion(1.0)).await.unwrap();
        sink.write(&motion(2.0)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().timestamp(), 1.0);
        assert_eq!(rx.recv().await.unwrap().timestamp(), 2.0);
    }

    #[tokio::test]
    async fn test_channel_sink_receiver_dropped() {
        let (mut sink, rx) = ChannelSink::new("chan", 4);
        drop(rx);

        let err = sink.write(&motion(1.0)).await.unwrap_err();
        assert!(matches!(err, ContractError::SinkClosed { sink_name } if sink_name == "chan"));
    }
}
