use std::collections::VecDeque;

use futures_util::stream::{self, Stream, StreamExt};

/// A directional converter fed one upstream item at a time.
///
/// `push` fully processes one item before the next is requested; `finish`
/// flushes whatever the upstream end implies (open blocks, terminal event).
pub trait StreamAdapter {
    type Input;
    type Output;

    fn push(&mut self, input: Self::Input) -> Vec<Self::Output>;

    fn finish(&mut self) -> Vec<Self::Output>;
}

/// Runs an adapter over an already-collected upstream.
pub fn collect_events<A, I>(mut adapter: A, inputs: I) -> Vec<A::Output>
where
    A: StreamAdapter,
    I: IntoIterator<Item = A::Input>,
{
    let mut outputs = Vec::new();
    for input in inputs {
        outputs.extend(adapter.push(input));
    }
    outputs.extend(adapter.finish());
    outputs
}

struct AdaptState<S, A: StreamAdapter> {
    upstream: S,
    adapter: A,
    pending: VecDeque<A::Output>,
    upstream_done: bool,
}

/// Lazily adapts `upstream`. Dropping the returned stream stops pulling from
/// upstream; nothing runs in the background.
pub fn adapt_stream<S, A>(upstream: S, adapter: A) -> impl Stream<Item = A::Output>
where
    S: Stream<Item = A::Input> + Unpin,
    A: StreamAdapter,
{
    let state = AdaptState {
        upstream,
        adapter,
        pending: VecDeque::new(),
        upstream_done: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(output) = state.pending.pop_front() {
                return Some((output, state));
            }
            if state.upstream_done {
                return None;
            }
            match state.upstream.next().await {
                Some(input) => {
                    let outputs = state.adapter.push(input);
                    state.pending.extend(outputs);
                }
                None => {
                    state.upstream_done = true;
                    let outputs = state.adapter.finish();
                    state.pending.extend(outputs);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;

    /// Echoes each input twice and appends a marker at the end.
    struct Doubler;

    impl StreamAdapter for Doubler {
        type Input = u32;
        type Output = u32;

        fn push(&mut self, input: u32) -> Vec<u32> {
            vec![input, input]
        }

        fn finish(&mut self) -> Vec<u32> {
            vec![0]
        }
    }

    #[tokio::test]
    async fn adapt_stream_flushes_finish_after_upstream_ends() {
        let adapted = adapt_stream(stream::iter(vec![1, 2]), Doubler);
        let outputs = adapted.collect::<Vec<_>>().await;
        assert_eq!(outputs, vec![1, 1, 2, 2, 0]);
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_consumption() {
        let adapted = adapt_stream(stream::iter(vec![1, 2, 3]), Doubler);
        let outputs = adapted.take(3).collect::<Vec<_>>().await;
        assert_eq!(outputs, vec![1, 1, 2]);
    }

    #[test]
    fn collect_events_matches_streaming_order() {
        assert_eq!(collect_events(Doubler, vec![7]), vec![7, 7, 0]);
    }
}
