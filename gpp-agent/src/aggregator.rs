//! Folding a model response into the assistant's answer

use futures::{Stream, StreamExt};
use gpp_providers::{ChatCompletion, ProviderResult, ResponseFragment};
use serde_json::Value;
use tracing::trace;

/// Final answer text plus every raw response object it was built from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResponse {
    pub content: String,
    pub raw_responses: Vec<Value>,
}

/// Consume a fragment stream in arrival order.
///
/// `tap` sees each fragment before the next one is polled, which is how the
/// caller echoes text as it arrives. Fragments without text still land in
/// `raw_responses`. The first stream error aborts the fold.
pub async fn aggregate_stream<S, F>(mut stream: S, mut tap: F) -> ProviderResult<AggregatedResponse>
where
    S: Stream<Item = ProviderResult<ResponseFragment>> + Unpin,
    F: FnMut(&ResponseFragment),
{
    let mut aggregated = AggregatedResponse::default();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        tap(&fragment);
        if let Some(text) = fragment.text() {
            aggregated.content.push_str(text);
        }
        aggregated.raw_responses.push(fragment.raw);
    }
    trace!(
        "Aggregated {} fragments into {} bytes",
        aggregated.raw_responses.len(),
        aggregated.content.len()
    );
    Ok(aggregated)
}

/// Wrap a non-streamed answer
pub fn aggregate_single(completion: ChatCompletion) -> AggregatedResponse {
    AggregatedResponse {
        content: completion.content,
        raw_responses: vec![completion.raw],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use gpp_providers::ProviderError;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fragment(text: &str) -> ProviderResult<ResponseFragment> {
        Ok(ResponseFragment::from_chunk(json!({
            "choices": [{"index": 0, "delta": {"content": text}}]
        })))
    }

    #[tokio::test]
    async fn test_stream_concatenates_in_order() {
        let fragments = stream::iter(vec![
            fragment("Hei"),
            fragment(""),
            fragment(" på"),
            fragment(" deg"),
        ]);
        let mut echoed = Vec::new();

        let aggregated = aggregate_stream(fragments, |f| {
            if let Some(text) = f.text() {
                echoed.push(text.to_string());
            }
        })
        .await
        .unwrap();

        assert_eq!(aggregated.content, "Hei på deg");
        assert_eq!(aggregated.raw_responses.len(), 4);
        assert_eq!(echoed, vec!["Hei", " på", " deg"]);
    }

    #[tokio::test]
    async fn test_tap_runs_before_next_fragment_is_polled() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let stream_log = Rc::clone(&log);
        let fragments = Box::pin(stream::unfold(0, move |n| {
            let stream_log = Rc::clone(&stream_log);
            async move {
                if n == 3 {
                    return None;
                }
                stream_log.borrow_mut().push(format!("poll {}", n));
                Some((fragment("x"), n + 1))
            }
        }));

        let tap_log = Rc::clone(&log);
        let mut taps = 0;
        aggregate_stream(fragments, |_| {
            tap_log.borrow_mut().push(format!("tap {}", taps));
            taps += 1;
        })
        .await
        .unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["poll 0", "tap 0", "poll 1", "tap 1", "poll 2", "tap 2"]
        );
    }

    #[tokio::test]
    async fn test_stream_error_aborts() {
        let fragments = stream::iter(vec![
            fragment("Hei"),
            Err(ProviderError::InvalidResponse("broken".to_string())),
            fragment(" igjen"),
        ]);
        let mut seen = 0;

        let result = aggregate_stream(fragments, |_| seen += 1).await;
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_single_response() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "Hallo"}}]});
        let completion = ChatCompletion::from_response(raw.clone()).unwrap();

        let aggregated = aggregate_single(completion);
        assert_eq!(aggregated.content, "Hallo");
        assert_eq!(aggregated.raw_responses, vec![raw]);
    }
}
