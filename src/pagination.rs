///! Forward-only walker over a nextToken-style paginated API.
///! The same walker drives transaction listing, per-transaction event listing and
///! balance listing, so it is generic over the request/response record types.
use std::future::Future;

pub trait PageRequest {
    /// Replaces the continuation cursor carried into the next fetch.
    fn set_next_token(&mut self, next_token: String);
}

pub trait PageResponse {
    /// Absence of a continuation cursor is the sole termination condition of a walk.
    fn next_token(&self) -> Option<&str>;
}

/// Walks a paginated result set strictly forward: each call to `next_page` issues
/// exactly one fetch, and the walk stops after the first response without a
/// continuation cursor. No page is fetched twice, no backtracking.
pub struct PageWalker<Req, F> {
    request: Option<Req>,
    fetch: F,
}

impl<Req, Res, Err, F, Fut> PageWalker<Req, F>
where
    Req: PageRequest + Clone,
    Res: PageResponse,
    F: FnMut(Req) -> Fut,
    Fut: Future<Output = Result<Res, Err>>,
{
    pub fn new(request: Req, fetch: F) -> Self {
        Self {
            request: Some(request),
            fetch,
        }
    }

    /// Whether another fetch is still pending. After a yielded page this tells
    /// callers whether that page carried a continuation cursor.
    pub fn has_more(&self) -> bool {
        self.request.is_some()
    }

    pub async fn next_page(&mut self) -> Result<Option<Res>, Err> {
        let Some(mut request) = self.request.take() else {
            return Ok(None);
        };
        let response = (self.fetch)(request.clone()).await?;
        if let Some(next_token) = response.next_token() {
            // The cursor is replaced, not accumulated; the rest of the request
            // keeps the parameters it was seeded with.
            request.set_next_token(next_token.to_string());
            self.request = Some(request);
        }
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Debug, Default)]
    struct FakeRequest {
        next_token: Option<String>,
    }

    impl PageRequest for FakeRequest {
        fn set_next_token(&mut self, next_token: String) {
            self.next_token = Some(next_token);
        }
    }

    #[derive(Debug)]
    struct FakeResponse {
        next_token: Option<String>,
        cursor_seen: Option<String>,
    }

    impl PageResponse for FakeResponse {
        fn next_token(&self) -> Option<&str> {
            self.next_token.as_deref()
        }
    }

    #[tokio::test]
    async fn yields_every_page_then_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_fetch = calls.clone();
        let mut walker = PageWalker::new(FakeRequest::default(), move |request: FakeRequest| {
            let calls = calls_in_fetch.clone();
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(FakeResponse {
                    next_token: (call < 2).then(|| format!("cursor-{call}")),
                    cursor_seen: request.next_token,
                })
            }
        });

        let mut pages = Vec::new();
        while let Some(page) = walker.next_page().await.unwrap() {
            pages.push(page);
        }

        assert_eq!(pages.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // The walk is over; further polling issues no more fetches.
        assert!(walker.next_page().await.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn threads_the_continuation_cursor_between_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_fetch = calls.clone();
        let mut walker = PageWalker::new(FakeRequest::default(), move |request: FakeRequest| {
            let calls = calls_in_fetch.clone();
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(FakeResponse {
                    next_token: (call == 0).then(|| "cursor-0".to_string()),
                    cursor_seen: request.next_token,
                })
            }
        });

        let first = walker.next_page().await.unwrap().unwrap();
        assert_eq!(first.cursor_seen, None);
        assert!(walker.has_more());

        let second = walker.next_page().await.unwrap().unwrap();
        assert_eq!(second.cursor_seen, Some("cursor-0".to_string()));
        assert!(!walker.has_more());
    }

    #[tokio::test]
    async fn single_page_result_sets_terminate_immediately() {
        let mut walker =
            PageWalker::new(FakeRequest::default(), |request: FakeRequest| async move {
                Ok::<_, ()>(FakeResponse {
                    next_token: None,
                    cursor_seen: request.next_token,
                })
            });

        assert!(walker.next_page().await.unwrap().is_some());
        assert!(!walker.has_more());
        assert!(walker.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let mut walker =
            PageWalker::new(FakeRequest::default(), |_request: FakeRequest| async move {
                Err::<FakeResponse, _>("upstream gone")
            });
        assert_eq!(walker.next_page().await.unwrap_err(), "upstream gone");
    }
}
