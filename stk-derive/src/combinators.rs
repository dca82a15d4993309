//! Stream operators used to compose derivations.
//!
//! All operators follow the same conventions: nothing is emitted before every
//! input produced a value, and an error from any input is forwarded and ends
//! the combined stream.
use futures_util::future;
use futures_util::stream;
use futures_util::Stream;
use futures_util::StreamExt;

use crate::QueryStream;

enum Step<L, R> {
    Left(L),
    Right(R),
}

/// Polls `stream` if present, otherwise never resolves.
async fn next_or_pending<S>(stream: &mut Option<S>) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    match stream {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

/// Emits the latest pair of values every time either side emits.
pub fn combine_latest<A, B>(
    left: QueryStream<A>,
    right: QueryStream<B>,
) -> QueryStream<(A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut left = Some(left);
        let mut right = Some(right);
        let mut last_left: Option<A> = None;
        let mut last_right: Option<B> = None;

        while left.is_some() || right.is_some() {
            let step = tokio::select! {
                item = next_or_pending(&mut left) => Step::Left(item),
                item = next_or_pending(&mut right) => Step::Right(item),
            };

            match step {
                Step::Left(Some(Ok(value))) => last_left = Some(value),
                Step::Right(Some(Ok(value))) => last_right = Some(value),
                Step::Left(Some(Err(err))) | Step::Right(Some(Err(err))) => {
                    yield Err(err);
                    break;
                },
                Step::Left(None) => {
                    if last_left.is_none() {
                        break;
                    }
                    left = None;
                    continue;
                },
                Step::Right(None) => {
                    if last_right.is_none() {
                        break;
                    }
                    right = None;
                    continue;
                },
            }

            if let (Some(l), Some(r)) = (&last_left, &last_right) {
                yield Ok((l.clone(), r.clone()));
            }
        }
    })
}

/// Maps every outer value to an inner stream, forwarding only the most recent
/// inner stream. A new outer value drops the previous inner stream.
pub fn switch_map<A, B, F>(
    outer: QueryStream<A>,
    mut project: F,
) -> QueryStream<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: FnMut(A) -> QueryStream<B> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut outer = Some(outer);
        let mut inner: Option<QueryStream<B>> = None;

        while outer.is_some() || inner.is_some() {
            let step = tokio::select! {
                biased;
                item = next_or_pending(&mut outer) => Step::Left(item),
                item = next_or_pending(&mut inner) => Step::Right(item),
            };

            match step {
                Step::Left(Some(Ok(value))) => inner = Some(project(value)),
                Step::Left(None) => outer = None,
                Step::Right(Some(Ok(value))) => {
                    yield Ok(value);
                },
                Step::Right(None) => inner = None,
                Step::Left(Some(Err(err))) | Step::Right(Some(Err(err))) => {
                    yield Err(err);
                    break;
                },
            }
        }
    })
}

/// [`combine_latest`] over any number of streams of the same type.
///
/// An empty input yields a single empty list right away.
pub fn combine_latest_all<T>(streams: Vec<QueryStream<T>>) -> QueryStream<Vec<T>>
where
    T: Clone + Send + 'static,
{
    if streams.is_empty() {
        return Box::pin(stream::once(future::ready(Ok(Vec::new()))));
    }

    let count = streams.len();
    let merged = stream::select_all(streams.into_iter().enumerate().map(|(index, inner)| {
        inner
            .map(move |item| (index, Some(item)))
            .chain(stream::once(future::ready((index, None))))
    }));

    Box::pin(async_stream::stream! {
        let mut merged = merged;
        let mut latest: Vec<Option<T>> = vec![None; count];

        while let Some((index, item)) = merged.next().await {
            match item {
                Some(Ok(value)) => latest[index] = Some(value),
                Some(Err(err)) => {
                    yield Err(err);
                    break;
                },
                None if latest[index].is_none() => break,
                None => continue,
            }

            if latest.iter().all(Option::is_some) {
                yield Ok(latest.iter().flatten().cloned().collect());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use futures_util::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::QueryError;

    fn channel<T: Send + 'static>() -> (mpsc::UnboundedSender<Result<T, QueryError>>, QueryStream<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, UnboundedReceiverStream::new(rx).boxed())
    }

    #[tokio::test]
    async fn combine_latest_waits_for_both_sides() {
        let (left_tx, left) = channel::<u32>();
        let (right_tx, right) = channel::<&'static str>();
        let mut combined = combine_latest(left, right);

        left_tx.send(Ok(1)).unwrap();
        right_tx.send(Ok("a")).unwrap();
        assert_eq!(combined.next().await, Some(Ok((1, "a"))));

        left_tx.send(Ok(2)).unwrap();
        assert_eq!(combined.next().await, Some(Ok((2, "a"))));

        right_tx.send(Ok("b")).unwrap();
        assert_eq!(combined.next().await, Some(Ok((2, "b"))));

        left_tx.send(Ok(3)).unwrap();
        assert_eq!(combined.next().await, Some(Ok((3, "b"))));
    }

    #[tokio::test]
    async fn combine_latest_forwards_errors_and_stops() {
        let (left_tx, left) = channel::<u32>();
        let (_right_tx, right) = channel::<u32>();
        let mut combined = combine_latest(left, right);

        left_tx
            .send(Err(QueryError::Backend("boom".into())))
            .unwrap();

        assert_eq!(
            combined.next().await,
            Some(Err(QueryError::Backend("boom".into())))
        );
        assert_eq!(combined.next().await, None);
    }

    #[tokio::test]
    async fn switch_map_drops_the_previous_inner_stream() {
        let (outer_tx, outer) = channel::<u32>();
        let (first_tx, first) = channel::<u32>();
        let (second_tx, second) = channel::<u32>();
        let mut inners = vec![second, first];

        let mut switched = switch_map(outer, move |_| inners.pop().unwrap());

        outer_tx.send(Ok(0)).unwrap();
        first_tx.send(Ok(10)).unwrap();
        assert_eq!(switched.next().await, Some(Ok(10)));

        outer_tx.send(Ok(1)).unwrap();
        second_tx.send(Ok(20)).unwrap();
        assert_eq!(switched.next().await, Some(Ok(20)));

        // the first inner stream has been dropped along with its receiver
        assert!(first_tx.send(Ok(11)).is_err());
    }

    #[tokio::test]
    async fn switch_map_keeps_listening_after_a_finite_inner() {
        let (outer_tx, outer) = channel::<u32>();
        let mut switched = switch_map(outer, |value| stream::iter([Ok(value * 2)]).boxed());

        outer_tx.send(Ok(1)).unwrap();
        assert_eq!(switched.next().await, Some(Ok(2)));

        outer_tx.send(Ok(5)).unwrap();
        assert_eq!(switched.next().await, Some(Ok(10)));

        drop(outer_tx);
        assert_eq!(switched.next().await, None);
    }

    #[tokio::test]
    async fn combine_latest_all_of_nothing_is_an_empty_list() {
        let mut combined = combine_latest_all::<u32>(Vec::new());

        assert_eq!(combined.next().await, Some(Ok(vec![])));
        assert_eq!(combined.next().await, None);
    }

    #[tokio::test]
    async fn combine_latest_all_keeps_input_order() {
        let (a_tx, a) = channel::<u32>();
        let (b_tx, b) = channel::<u32>();
        let mut combined = combine_latest_all(vec![a, b]);

        b_tx.send(Ok(2)).unwrap();
        a_tx.send(Ok(1)).unwrap();
        assert_eq!(combined.next().await, Some(Ok(vec![1, 2])));

        b_tx.send(Ok(3)).unwrap();
        assert_eq!(combined.next().await, Some(Ok(vec![1, 3])));
    }
}
