//! Ordered plugin execution.

use std::fmt;
use std::sync::Arc;

use tracing::{Instrument, debug, debug_span, trace};

use crate::{Adapter, AdapterDispatch, Dispatch, Plugin, Request, Response, Result, Retry};

/// Ordered list of plugins shared by every call of a client.
///
/// The order is significant and is the iteration order of both hooks.
/// Cloning is cheap; adding a plugin to a clone does not affect the original.
#[derive(Clone, Default)]
pub struct Pipeline {
    plugins: Arc<Vec<Arc<dyn Plugin>>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a plugin.
    #[must_use]
    pub fn with(self, plugin: impl Plugin + 'static) -> Self {
        self.with_shared(Arc::new(plugin))
    }

    /// Appends a plugin that is shared with other pipelines.
    #[must_use]
    pub fn with_shared(mut self, plugin: Arc<dyn Plugin>) -> Self {
        Arc::make_mut(&mut self.plugins).push(plugin);
        self
    }

    /// Number of plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// No plugins: adapters call the native client directly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugins in execution order.
    #[must_use]
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// Runs every `before_request` hook in order.
    ///
    /// # Errors
    ///
    /// Stops at the first hook error and returns it.
    pub async fn run_before_request(&self, mut request: Request) -> Result<Request> {
        for plugin in self.plugins.iter() {
            let name = plugin.name();
            request = plugin
                .before_request(request)
                .instrument(debug_span!("plugin", name, hook = "before_request"))
                .await
                .inspect_err(|err| debug!(plugin = name, error = %err, "before_request failed"))?;
            trace!(plugin = name, method = %request.method(), url = %request.url(), "before_request done");
        }
        Ok(request)
    }

    /// Runs every `after_response` hook in order.
    ///
    /// Each hook gets a fresh [`Retry`]; the last request it re-sent replaces
    /// the current request for the following hooks. Returns the final
    /// response together with the final current request.
    ///
    /// # Errors
    ///
    /// Stops at the first hook error and returns it.
    pub async fn run_after_response(
        &self,
        mut response: Response,
        mut request: Request,
        dispatch: &dyn Dispatch,
    ) -> Result<(Response, Request)> {
        for plugin in self.plugins.iter() {
            let name = plugin.name();
            let retry = Retry::new(dispatch);
            response = plugin
                .after_response(response, &request, &retry)
                .instrument(debug_span!("plugin", name, hook = "after_response"))
                .await
                .inspect_err(|err| debug!(plugin = name, error = %err, "after_response failed"))?;

            let retries = retry.attempts();
            if retries > 0 {
                debug!(plugin = name, retries, "plugin retried request");
            }
            if let Some(latest) = retry.into_latest() {
                request = latest;
            }
            trace!(plugin = name, status = response.status(), "after_response done");
        }
        Ok((response, request))
    }

    /// Runs a whole call through `adapter`.
    ///
    /// The request is converted to canonical form, rewritten by the request
    /// hooks, sent as a duplicate (the original is kept for the response
    /// hooks and retries), and the response is rewritten by the response
    /// hooks before being converted back. Without plugins the native request
    /// goes straight to [`Adapter::send`].
    ///
    /// # Errors
    ///
    /// Returns hook, conversion and send errors unchanged.
    pub async fn handle<A: Adapter>(
        &self,
        adapter: &A,
        request: A::NativeRequest,
    ) -> Result<A::NativeResponse> {
        if self.is_empty() {
            return adapter.send(request).await;
        }

        let request = adapter.to_canonical_request(request)?;
        let request = self.run_before_request(request).await?;

        let dispatch = AdapterDispatch(adapter);
        let sent = request.try_clone().await?;
        let response = dispatch.dispatch(sent).await?;

        let (response, request) = self
            .run_after_response(response, request, &dispatch)
            .await?;
        adapter.apply_canonical_response(response, &request).await
    }
}

impl FromIterator<Arc<dyn Plugin>> for Pipeline {
    fn from_iter<T: IntoIterator<Item = Arc<dyn Plugin>>>(iter: T) -> Self {
        Self {
            plugins: Arc::new(iter.into_iter().collect()),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|plugin| plugin.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use assert2::{check, let_assert};
    use async_trait::async_trait;

    use super::*;
    use crate::{AbortController, Error, Headers, Method};

    #[derive(Debug, Clone)]
    struct Sent {
        method: Method,
        headers: Headers,
        body: String,
    }

    /// Adapter whose native types are the canonical ones, recording sends.
    struct Recorder {
        sent: Mutex<Vec<Sent>>,
        conversions: Mutex<u32>,
        statuses: Mutex<Vec<u16>>,
        delay: Option<Duration>,
    }

    impl Recorder {
        fn new(statuses: &[u16]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                conversions: Mutex::new(0),
                statuses: Mutex::new(statuses.iter().rev().copied().collect()),
                delay: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new(&[])
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Adapter for Recorder {
        type NativeRequest = Request;
        type NativeResponse = Response;

        fn to_canonical_request(&self, request: Request) -> Result<Request> {
            *self.conversions.lock().expect("lock") += 1;
            Ok(request)
        }

        async fn apply_canonical_request(&self, request: Request) -> Result<Request> {
            Ok(request)
        }

        fn to_canonical_response(&self, response: Response) -> Result<Response> {
            Ok(response)
        }

        async fn apply_canonical_response(
            &self,
            response: Response,
            _request: &Request,
        ) -> Result<Response> {
            Ok(response)
        }

        async fn send(&self, request: Request) -> Result<Response> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let body = request.text().await?;
            self.sent.lock().expect("lock").push(Sent {
                method: request.method(),
                headers: request.headers().clone(),
                body,
            });
            let status = self.statuses.lock().expect("lock").pop().unwrap_or(200);
            Ok(Response::new(status, Headers::new(), "native"))
        }
    }

    fn get() -> Request {
        Request::new(Method::Get, "https://example.com/items".parse().expect("url"))
    }

    struct SetHeader(&'static str, &'static str);

    #[async_trait]
    impl Plugin for SetHeader {
        fn name(&self) -> &str {
            "set-header"
        }

        async fn before_request(&self, request: Request) -> Result<Request> {
            request.with_header(self.0, self.1)
        }
    }

    struct AppendHeader(&'static str, &'static str);

    #[async_trait]
    impl Plugin for AppendHeader {
        fn name(&self) -> &str {
            "append-header"
        }

        async fn before_request(&self, request: Request) -> Result<Request> {
            let mut headers = request.headers().clone();
            headers.append(self.0, self.1)?;
            Ok(request.with_headers(headers))
        }
    }

    /// Copies headers forward, adds one and replaces the body.
    struct Stamp {
        header: &'static str,
        value: &'static str,
        body: &'static str,
    }

    #[async_trait]
    impl Plugin for Stamp {
        fn name(&self) -> &str {
            self.header
        }

        async fn after_response(
            &self,
            response: Response,
            _request: &Request,
            _retry: &Retry<'_>,
        ) -> Result<Response> {
            let mut headers = response.headers().clone();
            headers.set(self.header, self.value)?;
            Ok(Response::new(response.status(), headers, self.body))
        }
    }

    /// Retries a failed response as a POST.
    struct RetryAsPost;

    #[async_trait]
    impl Plugin for RetryAsPost {
        fn name(&self) -> &str {
            "retry-as-post"
        }

        async fn after_response(
            &self,
            response: Response,
            request: &Request,
            retry: &Retry<'_>,
        ) -> Result<Response> {
            if response.ok() {
                return Ok(response);
            }
            let request = request.try_clone().await?.with_method(Method::Post);
            retry.send(request).await
        }
    }

    #[derive(Default)]
    struct Observe {
        methods: Mutex<Vec<Method>>,
    }

    #[async_trait]
    impl Plugin for Observe {
        fn name(&self) -> &str {
            "observe"
        }

        async fn after_response(
            &self,
            response: Response,
            request: &Request,
            _retry: &Retry<'_>,
        ) -> Result<Response> {
            self.methods.lock().expect("lock").push(request.method());
            Ok(response)
        }
    }

    struct Fail;

    #[async_trait]
    impl Plugin for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        async fn before_request(&self, _request: Request) -> Result<Request> {
            Err(Error::plugin("fail", "refusing"))
        }
    }

    #[tokio::test]
    async fn empty_pipeline_sends_natively() {
        let adapter = Recorder::new(&[]);
        let response = Pipeline::new()
            .handle(&adapter, get())
            .await
            .expect("response");

        check!(response.status() == 200);
        check!(*adapter.conversions.lock().expect("lock") == 0);
        check!(adapter.sent().len() == 1);
    }

    #[tokio::test]
    async fn before_request_hooks_run_in_order() {
        let adapter = Recorder::new(&[]);
        let pipeline = Pipeline::new()
            .with(SetHeader("x-order", "1"))
            .with(AppendHeader("x-order", "2"))
            .with(SetHeader("accept", "text/plain"));

        let request = get().with_header("accept", "application/json").expect("header");
        pipeline.handle(&adapter, request).await.expect("response");

        let sent = adapter.sent();
        let_assert!([sent] = sent.as_slice());
        check!(sent.headers.get("x-order") == Some("1, 2".to_string()));
        check!(sent.headers.get_all("accept") == vec!["text/plain"]);
    }

    #[tokio::test]
    async fn after_response_hooks_fold_left_to_right() {
        let adapter = Recorder::new(&[]);
        let pipeline = Pipeline::new()
            .with(Stamp {
                header: "x-first",
                value: "foo",
                body: "first",
            })
            .with(Stamp {
                header: "x-second",
                value: "bar",
                body: "second",
            });

        let response = pipeline.handle(&adapter, get()).await.expect("response");

        check!(response.headers().get("x-first") == Some("foo".to_string()));
        check!(response.headers().get("x-second") == Some("bar".to_string()));
        check!(response.text().await.expect("body") == "second");
    }

    #[tokio::test]
    async fn retry_changes_method_for_following_plugins() {
        let adapter = Recorder::new(&[500, 201]);
        let observe = Arc::new(Observe::default());
        let pipeline = Pipeline::new()
            .with(RetryAsPost)
            .with_shared(observe.clone());

        let response = pipeline.handle(&adapter, get()).await.expect("response");

        check!(response.status() == 201);
        let methods: Vec<_> = adapter.sent().iter().map(|sent| sent.method).collect();
        check!(methods == vec![Method::Get, Method::Post]);
        check!(*observe.methods.lock().expect("lock") == vec![Method::Post]);
    }

    #[tokio::test]
    async fn retry_resends_the_kept_body() {
        struct ResendOnce;

        #[async_trait]
        impl Plugin for ResendOnce {
            fn name(&self) -> &str {
                "resend-once"
            }

            async fn after_response(
                &self,
                _response: Response,
                request: &Request,
                retry: &Retry<'_>,
            ) -> Result<Response> {
                retry.resend(request).await
            }
        }

        let adapter = Recorder::new(&[]);
        let request = Request::new(Method::Post, "https://example.com/".parse().expect("url"))
            .with_body("payload");

        Pipeline::new()
            .with(ResendOnce)
            .handle(&adapter, request)
            .await
            .expect("response");

        let bodies: Vec<_> = adapter.sent().into_iter().map(|sent| sent.body).collect();
        check!(bodies == vec!["payload".to_string(), "payload".to_string()]);
    }

    #[tokio::test]
    async fn hook_error_stops_the_call() {
        let adapter = Recorder::new(&[]);
        let observe = Arc::new(Observe::default());
        let pipeline = Pipeline::new().with(Fail).with_shared(observe.clone());

        let_assert!(Err(err) = pipeline.handle(&adapter, get()).await);
        insta::assert_snapshot!(err.to_string(), @"plugin 'fail' failed: refusing");
        check!(adapter.sent().is_empty());
        check!(observe.methods.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn aborted_before_send_skips_response_hooks() {
        let adapter = Recorder::new(&[]);
        let observe = Arc::new(Observe::default());
        let pipeline = Pipeline::new().with_shared(observe.clone());

        let controller = AbortController::new();
        controller.abort();
        let request = get().with_signal(Some(controller.signal()));

        let_assert!(Err(Error::Aborted) = pipeline.handle(&adapter, request).await);
        check!(adapter.sent().is_empty());
        check!(observe.methods.lock().expect("lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_during_send_rejects() {
        let adapter = Recorder::slow(Duration::from_secs(30));
        let observe = Arc::new(Observe::default());
        let pipeline = Pipeline::new().with_shared(observe.clone());

        let controller = AbortController::new();
        let request = get().with_signal(Some(controller.signal()));
        let abort = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            controller.abort();
        };

        let (result, ()) = tokio::join!(pipeline.handle(&adapter, request), abort);
        let_assert!(Err(err) = result);
        check!(err.is_aborted());
        check!(observe.methods.lock().expect("lock").is_empty());
    }

    #[test]
    fn pipeline_clones_are_independent() {
        let base = Pipeline::new().with(SetHeader("a", "1"));
        let extended = base.clone().with(Fail);

        check!(base.len() == 1);
        check!(extended.len() == 2);
        check!(format!("{extended:?}") == r#"["set-header", "fail"]"#);
    }

    #[test]
    fn pipeline_from_iterator() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Fail), Arc::new(RetryAsPost)];
        let pipeline: Pipeline = plugins.into_iter().collect();
        let names: Vec<_> = pipeline.plugins().iter().map(|p| p.name().to_string()).collect();
        check!(names == vec!["fail".to_string(), "retry-as-post".to_string()]);
    }
}
