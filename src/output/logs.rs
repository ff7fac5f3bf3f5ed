//! Log truncation and the follow-mode log stream.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::cluster::{ClusterApi, ClusterResourceRef, LogOptions};
use crate::types::{Error, LogConfig, Result};

/// Keep the last `max_lines` lines of `text`, prefixed by a marker line that
/// counts the dropped ones.
pub fn truncate_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return lines.join("\n");
    }
    let dropped = lines.len() - max_lines;
    let kept = &lines[dropped..];
    let mut out = format!("... ({} earlier lines truncated)", dropped);
    for line in kept {
        out.push('\n');
        out.push_str(line);
    }
    out
}

/// Producer tuning for [`LogStream`].
#[derive(Debug, Clone, Copy)]
pub struct LogStreamSettings {
    /// Stop after this many lines.
    pub limit: Option<usize>,
    /// Reconnect attempts after a mid-stream error.
    pub max_reconnects: u32,
    /// Channel capacity between producer and consumer.
    pub capacity: usize,
}

impl LogStreamSettings {
    pub fn from_config(config: &LogConfig, limit: Option<usize>) -> Self {
        Self {
            limit,
            max_reconnects: config.max_reconnects,
            capacity: config.stream_channel_capacity.max(1),
        }
    }
}

/// Lazy, cancellable sequence of log lines.
///
/// A background task owns the cluster connection and feeds a bounded channel.
/// The sequence ends when the cluster closes the stream, the line limit is
/// reached, [`LogStream::cancel`] is called, or the stream is dropped. In
/// each case the producer exits and releases the connection.
pub struct LogStream {
    rx: mpsc::Receiver<Result<String>>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl std::fmt::Debug for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl LogStream {
    /// Start following logs of `target`.
    pub fn follow(
        cluster: Arc<dyn ClusterApi>,
        target: ClusterResourceRef,
        opts: LogOptions,
        settings: LogStreamSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.capacity.max(1));
        let cancel = CancellationToken::new();
        let producer_cancel = cancel.clone();
        tokio::spawn(async move {
            produce(cluster, target, opts, settings, tx, producer_cancel).await;
        });
        Self {
            rx,
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Stop the producer. Lines already buffered are still yielded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Collect lines until the stream ends or `window` elapses, then cancel.
    ///
    /// An error after some lines were received is reported as a trailing
    /// line; an error before any line is returned as is.
    pub async fn collect_for(mut self, window: Duration) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                next = self.next() => match next {
                    Some(Ok(line)) => lines.push(line),
                    Some(Err(e)) if lines.is_empty() => return Err(e),
                    Some(Err(e)) => {
                        lines.push(format!("[log stream ended: {}]", e.to_user_message()));
                        break;
                    }
                    None => break,
                },
            }
        }
        self.cancel();
        Ok(lines)
    }
}

impl Stream for LogStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

async fn produce(
    cluster: Arc<dyn ClusterApi>,
    target: ClusterResourceRef,
    mut opts: LogOptions,
    settings: LogStreamSettings,
    tx: mpsc::Sender<Result<String>>,
    cancel: CancellationToken,
) {
    opts.follow = true;
    let mut sent = 0usize;
    let mut reconnects = 0u32;
    if settings.limit == Some(0) {
        return;
    }

    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = cluster.log_stream(&target, &opts) => opened,
        };
        let mut lines = match opened {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!("Failed to open log stream for {}: {}", target, e);
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        let failure = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                next = lines.next() => next,
            };
            match next {
                Some(Ok(line)) => {
                    let delivered = tokio::select! {
                        _ = cancel.cancelled() => return,
                        res = tx.send(Ok(line)) => res.is_ok(),
                    };
                    if !delivered {
                        return;
                    }
                    sent += 1;
                    if settings.limit.is_some_and(|limit| sent >= limit) {
                        tracing::debug!("Log stream for {} reached its {} line limit", target, sent);
                        return;
                    }
                }
                Some(Err(e)) => break e,
                None => return,
            }
        };

        if reconnects >= settings.max_reconnects {
            tracing::warn!(
                "Log stream for {} failed after {} reconnects: {}",
                target,
                reconnects,
                failure
            );
            let _ = tx
                .send(Err(Error::connectivity(format!(
                    "log stream interrupted: {}",
                    failure
                ))))
                .await;
            return;
        }
        reconnects += 1;
        tracing::info!(
            "Log stream for {} dropped ({}), reconnecting ({}/{})",
            target,
            failure,
            reconnects,
            settings.max_reconnects
        );
        // Only lines written after the reconnect.
        opts.tail_lines = Some(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MockClusterApi, ResourceKind};
    use crate::types::ErrorKind;
    use futures::stream;

    fn target() -> ClusterResourceRef {
        ClusterResourceRef::namespaced(ResourceKind::Pod, "default", "web-0")
    }

    fn settings(limit: Option<usize>) -> LogStreamSettings {
        LogStreamSettings {
            limit,
            max_reconnects: 1,
            capacity: 4,
        }
    }

    #[test]
    fn test_truncate_keeps_last_lines() {
        let text = "1\n2\n3\n4\n5";
        assert_eq!(truncate_lines(text, 2), "... (3 earlier lines truncated)\n4\n5");
        assert_eq!(truncate_lines(text, 5), text);
        assert_eq!(truncate_lines("", 3), "");
    }

    #[tokio::test]
    async fn test_stream_stops_at_limit() {
        let mut mock = MockClusterApi::new();
        mock.expect_log_stream().times(1).returning(|_, opts| {
            assert!(opts.follow);
            let lines = (0..100).map(|i| Ok(format!("line {}", i)));
            Ok(stream::iter(lines).boxed())
        });

        let stream = LogStream::follow(Arc::new(mock), target(), LogOptions::default(), settings(Some(3)));
        let lines: Vec<String> = stream.map(|l| l.unwrap()).collect().await;
        assert_eq!(lines, vec!["line 0", "line 1", "line 2"]);
    }

    #[tokio::test]
    async fn test_reconnect_uses_zero_tail() {
        let mut mock = MockClusterApi::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_log_stream()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(stream::iter(vec![
                    Ok("a".to_string()),
                    Err(Error::connectivity("reset by peer")),
                ])
                .boxed())
            });
        mock.expect_log_stream()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, opts| {
                assert_eq!(opts.tail_lines, Some(0));
                Ok(stream::iter(vec![Ok("b".to_string())]).boxed())
            });

        let stream = LogStream::follow(Arc::new(mock), target(), LogOptions::default(), settings(None));
        let lines: Vec<String> = stream.map(|l| l.unwrap()).collect().await;
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_reconnects() {
        let mut mock = MockClusterApi::new();
        mock.expect_log_stream().times(2).returning(|_, _| {
            Ok(stream::iter(vec![Err(Error::connectivity("reset by peer"))]).boxed())
        });

        let stream = LogStream::follow(Arc::new(mock), target(), LogOptions::default(), settings(None));
        let items: Vec<Result<String>> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().kind(), ErrorKind::Connectivity);
    }

    #[tokio::test]
    async fn test_cancel_ends_pending_stream() {
        let mut mock = MockClusterApi::new();
        mock.expect_log_stream()
            .returning(|_, _| Ok(stream::pending::<Result<String>>().boxed()));

        let mut stream = LogStream::follow(Arc::new(mock), target(), LogOptions::default(), settings(None));
        stream.cancel();
        let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap();
        assert!(next.is_none());
        assert!(stream.is_cancelled());
    }

    #[tokio::test]
    async fn test_collect_for_window() {
        let mut mock = MockClusterApi::new();
        mock.expect_log_stream().returning(|_, _| {
            Ok(stream::iter(vec![Ok::<_, Error>("x".to_string())])
                .chain(stream::pending::<Result<String>>())
                .boxed())
        });

        let stream = LogStream::follow(Arc::new(mock), target(), LogOptions::default(), settings(None));
        let lines = stream.collect_for(Duration::from_millis(50)).await.unwrap();
        assert_eq!(lines, vec!["x"]);
    }
}
