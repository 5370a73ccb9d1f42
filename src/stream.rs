//! Fragment streams: a model reply delivered as a lazy sequence of text
//! pieces.
//!
//! A [`FragmentStream`] is finite and cannot be restarted. Its items arrive
//! in the order the server produced them, and the concatenation of all `Ok`
//! items is the model's full reply. No incremental JSON parsing happens
//! here: [`drain_fragments`] collects the text and hands it to the
//! sanitiser as a whole.

use crate::error::ExtractError;
use futures::StreamExt;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::debug;

/// A boxed stream of reply fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ExtractError>> + Send>>;

/// Concatenate every fragment in arrival order.
///
/// The first `Err` item aborts the drain and is returned; fragments
/// received before it are discarded.
pub async fn drain_fragments(mut stream: FragmentStream) -> Result<String, ExtractError> {
    let mut text = String::new();
    let mut count = 0usize;
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
        count += 1;
    }
    debug!("Drained {} fragments → {} bytes", count, text.len());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn fragments(items: Vec<Result<String, ExtractError>>) -> FragmentStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn concatenates_in_order() {
        let s = fragments(vec![
            Ok("```json\n{\"to".into()),
            Ok("tal\": 4".into()),
            Ok("2}\n```".into()),
        ]);
        assert_eq!(
            drain_fragments(s).await.unwrap(),
            "```json\n{\"total\": 42}\n```"
        );
    }

    #[test]
    fn empty_stream_is_empty_text() {
        let text = tokio_test::block_on(drain_fragments(fragments(vec![]))).unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn error_aborts_drain() {
        let s = fragments(vec![
            Ok("{".into()),
            Err(ExtractError::Upstream {
                message: "connection reset".into(),
            }),
            Ok("}".into()),
        ]);
        let err = drain_fragments(s).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}
