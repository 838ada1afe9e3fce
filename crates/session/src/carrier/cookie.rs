//! Cookie carrier: the session travels as one encrypted cookie.
//!
//! Per request, [`EncryptedCookieService`]:
//! 1. Decodes the named cookie (if any) into a fresh [`Session`].
//! 2. Inserts the session into request extensions and calls the inner service.
//! 3. When the inner response future resolves, encodes the session and appends
//!    a `Set-Cookie` header.
//!
//! Step 3 runs exactly once per successful response, however long the inner
//! service takes to complete. No cookie is emitted for an empty session, when
//! no cookie domain can be determined, or when encryption fails.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::http::{header, HeaderMap, HeaderValue, Request, Response};
use cookie::Cookie;
use time::OffsetDateTime;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::Session;
use crate::config::{CodecConfig, CookieOptions, SessionSettings};
use crate::session::{Padding, SessionCodec};

/// [`Layer`] that wraps services with [`EncryptedCookieService`].
#[derive(Debug, Clone)]
pub struct EncryptedCookieLayer {
    codec: SessionCodec,
    options: Arc<CookieOptions>,
}

impl EncryptedCookieLayer {
    /// Create a layer with default cookie attributes.
    pub fn new(config: CodecConfig) -> Self {
        Self::with_options(config, CookieOptions::default())
    }

    pub fn with_options(config: CodecConfig, options: CookieOptions) -> Self {
        Self {
            codec: SessionCodec::new(config),
            options: Arc::new(options),
        }
    }

    /// Build a layer from environment-style settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the codec configuration is invalid.
    pub fn from_settings(settings: &SessionSettings) -> anyhow::Result<Self> {
        Ok(Self::with_options(
            settings.codec_config()?,
            settings.cookie_options(),
        ))
    }
}

impl<S> Layer<S> for EncryptedCookieLayer {
    type Service = EncryptedCookieService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EncryptedCookieService {
            inner,
            codec: self.codec.clone(),
            options: self.options.clone(),
        }
    }
}

/// Middleware that loads and stores the session in an encrypted cookie.
#[derive(Debug, Clone)]
pub struct EncryptedCookieService<S> {
    inner: S,
    codec: SessionCodec,
    options: Arc<CookieOptions>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for EncryptedCookieService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let ctx = RequestContext::load(&self.codec, &self.options, &req);
        req.extensions_mut().insert(ctx.session.clone());

        // The clone that was driven to readiness serves this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            ctx.store(response.headers_mut());
            Ok(response)
        })
    }
}

// ---------------------------------------------------------------------------
// Per-request context
// ---------------------------------------------------------------------------

/// State owned by one in-flight request, from decode to encode.
struct RequestContext {
    codec: SessionCodec,
    options: Arc<CookieOptions>,
    session: Session,
    domain: Option<String>,
}

impl RequestContext {
    fn load<B>(codec: &SessionCodec, options: &Arc<CookieOptions>, req: &Request<B>) -> Self {
        let envelope = find_cookie(req.headers(), &options.name);
        let record = codec.decode(envelope.as_deref());
        let domain = options.domain.clone().or_else(|| request_host(req));
        Self {
            codec: codec.clone(),
            options: options.clone(),
            session: Session::new(record),
            domain,
        }
    }

    /// Encode the session and append the cookie. Consumes the context so the
    /// cookie is written at most once.
    fn store(self, headers: &mut HeaderMap) {
        let record = self.session.snapshot();
        if record.is_empty() {
            return;
        }
        let Some(domain) = self.domain else {
            debug!(cookie = %self.options.name, "no cookie domain, session cookie suppressed");
            return;
        };
        let Some(envelope) = self.codec.encode(&record, Padding::Strip) else {
            return;
        };

        let cookie = build_cookie(&self.options, domain, envelope);
        match HeaderValue::from_str(&cookie.encoded().to_string()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "session cookie is not a valid header value"),
        }
    }
}

/// Value of the first cookie called `name` across all `Cookie` headers.
fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_owned())
}

/// Request host without port, if it is a name rather than an address.
fn request_host<B>(req: &Request<B>) -> Option<String> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host())?;
    let name = host.split(':').next()?;
    name.starts_with(|c: char| c.is_ascii_alphabetic())
        .then(|| name.to_owned())
}

fn build_cookie(options: &CookieOptions, domain: String, value: String) -> Cookie<'static> {
    let mut builder = Cookie::build((options.name.clone(), value))
        .domain(domain)
        .path(options.path.clone())
        .http_only(options.http_only);

    let expires_at = options
        .expires
        .and_then(|lifetime| time::Duration::try_from(lifetime).ok())
        .and_then(|lifetime| OffsetDateTime::now_utc().checked_add(lifetime));
    if let Some(at) = expires_at {
        builder = builder.expires(at);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use axum::body::Body;
    use tokio::sync::oneshot;
    use tower::{ServiceBuilder, ServiceExt};

    use super::*;
    use crate::test_support::capture_warnings_async;

    const GARBAGE: &str = "e7eibXYTy%2BSTQJLx1234qXK1QT2VL5mZZZZaa1KYzd8%3D";

    fn options(domain: Option<&str>) -> CookieOptions {
        CookieOptions {
            domain: domain.map(str::to_owned),
            ..CookieOptions::default()
        }
    }

    fn layer(domain: Option<&str>) -> EncryptedCookieLayer {
        EncryptedCookieLayer::with_options(CodecConfig::new("s3cr3t").unwrap(), options(domain))
    }

    fn session_of<B>(req: &Request<B>) -> Session {
        req.extensions()
            .get::<Session>()
            .cloned()
            .expect("request includes Session extension")
    }

    async fn set_test(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        session_of(&req).insert("test", 1).unwrap();
        Ok(Response::new(Body::empty()))
    }

    async fn noop(_: Request<Body>) -> Result<Response<Body>, Infallible> {
        Ok(Response::new(Body::empty()))
    }

    async fn echo_test(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let test = session_of(&req).get::<i64>("test");
        Ok(Response::new(Body::from(format!("{test:?}"))))
    }

    fn set_cookie(res: &Response<Body>) -> Option<Cookie<'static>> {
        let value = res.headers().get(header::SET_COOKIE)?.to_str().ok()?;
        Cookie::parse_encoded(value.to_owned()).ok()
    }

    fn cookie_header(cookie: &Cookie<'_>) -> String {
        Cookie::new(cookie.name().to_owned(), cookie.value().to_owned())
            .encoded()
            .to_string()
    }

    async fn body_text(res: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn no_cookie_without_session_data() {
        let svc = ServiceBuilder::new().layer(layer(Some("localhost"))).service_fn(noop);
        let res = svc.oneshot(Request::new(Body::empty())).await.unwrap();
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn sets_cookie_with_session_data() {
        let svc = ServiceBuilder::new().layer(layer(Some("localhost"))).service_fn(set_test);
        let res = svc.oneshot(Request::new(Body::empty())).await.unwrap();

        let cookie = set_cookie(&res).expect("session cookie");
        assert_eq!(cookie.name(), "session");
        assert!(!cookie.value().is_empty());
        assert_eq!(cookie.domain(), Some("localhost"));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), None);

        let expires = cookie.expires_datetime().expect("expiry");
        let ahead = expires - OffsetDateTime::now_utc();
        assert!(ahead > time::Duration::minutes(14) && ahead <= time::Duration::minutes(15));
    }

    #[tokio::test]
    async fn http_only_flag_is_applied() {
        let opts = CookieOptions {
            http_only: true,
            expires: None,
            ..options(Some("localhost"))
        };
        let layer = EncryptedCookieLayer::with_options(CodecConfig::new("s3cr3t").unwrap(), opts);
        let svc = ServiceBuilder::new().layer(layer).service_fn(set_test);
        let res = svc.oneshot(Request::new(Body::empty())).await.unwrap();

        let cookie = set_cookie(&res).unwrap();
        assert_eq!(cookie.http_only(), Some(true));
        assert!(cookie.expires().is_none());
    }

    #[tokio::test]
    async fn loads_and_resets_the_cookie() {
        let svc = ServiceBuilder::new().layer(layer(Some("localhost"))).service_fn(set_test);
        let first = svc.oneshot(Request::new(Body::empty())).await.unwrap();
        let cookie = set_cookie(&first).unwrap();

        let svc = ServiceBuilder::new().layer(layer(Some("localhost"))).service_fn(echo_test);
        let req = Request::builder()
            .header(header::COOKIE, cookie_header(&cookie))
            .body(Body::empty())
            .unwrap();
        let second = svc.oneshot(req).await.unwrap();

        let reset = set_cookie(&second).expect("cookie re-issued");
        assert_ne!(reset.value(), cookie.value());
        assert_eq!(body_text(second).await, "Some(1)");
    }

    #[tokio::test]
    async fn finds_cookie_among_others() {
        let svc = ServiceBuilder::new().layer(layer(Some("localhost"))).service_fn(set_test);
        let first = svc.oneshot(Request::new(Body::empty())).await.unwrap();
        let cookie = set_cookie(&first).unwrap();

        let svc = ServiceBuilder::new().layer(layer(Some("localhost"))).service_fn(echo_test);
        let req = Request::builder()
            .header(header::COOKIE, "theme=dark; lang=en")
            .header(header::COOKIE, format!("other=1; {}", cookie_header(&cookie)))
            .body(Body::empty())
            .unwrap();
        let res = svc.oneshot(req).await.unwrap();
        assert_eq!(body_text(res).await, "Some(1)");
    }

    #[tokio::test]
    async fn uses_host_header_without_configured_domain() {
        let svc = ServiceBuilder::new().layer(layer(None)).service_fn(set_test);
        let req = Request::builder()
            .header(header::HOST, "myhost:8080")
            .body(Body::empty())
            .unwrap();
        let res = svc.oneshot(req).await.unwrap();
        assert_eq!(set_cookie(&res).unwrap().domain(), Some("myhost"));
    }

    #[tokio::test]
    async fn address_hosts_are_not_a_destination() {
        let svc = ServiceBuilder::new().layer(layer(None)).service_fn(set_test);
        let req = Request::builder()
            .header(header::HOST, "127.0.0.1")
            .body(Body::empty())
            .unwrap();
        let res = svc.oneshot(req).await.unwrap();
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn no_destination_suppresses_cookie() {
        let svc = ServiceBuilder::new().layer(layer(None)).service_fn(set_test);
        let (res, warnings) =
            capture_warnings_async(svc.oneshot(Request::new(Body::empty()))).await;
        assert!(res.unwrap().headers().get(header::SET_COOKIE).is_none());
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn unknown_cipher_warns_and_sets_no_cookie() {
        let config = CodecConfig::new("s3cr3t").unwrap().with_cipher("xxx");
        let layer = EncryptedCookieLayer::with_options(config, options(Some("localhost")));
        let svc = ServiceBuilder::new().layer(layer).service_fn(set_test);

        let (res, warnings) =
            capture_warnings_async(svc.oneshot(Request::new(Body::empty()))).await;
        assert!(res.unwrap().headers().get(header::SET_COOKIE).is_none());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("unsupported cipher"), "{}", warnings[0]);
    }

    #[tokio::test]
    async fn corrupted_cookie_is_an_empty_session_and_heals() {
        async fn check_then_set(req: Request<Body>) -> Result<Response<Body>, Infallible> {
            let session = session_of(&req);
            assert!(session.is_empty());
            session.insert("test", 1).unwrap();
            Ok(Response::new(Body::empty()))
        }

        let svc = ServiceBuilder::new()
            .layer(layer(Some("localhost")))
            .service_fn(check_then_set);
        let req = Request::builder()
            .header(header::COOKIE, format!("session={GARBAGE}"))
            .body(Body::empty())
            .unwrap();

        let (res, warnings) = capture_warnings_async(svc.oneshot(req)).await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("bad decrypt"), "{}", warnings[0]);
        assert!(set_cookie(&res.unwrap()).is_some());
    }

    #[tokio::test]
    async fn deferred_completion_writes_cookie_once() {
        async fn deferred(req: Request<Body>) -> Result<Response<Body>, Infallible> {
            let session = session_of(&req);
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                session.insert("done", true).unwrap();
                let _ = tx.send(Response::new(Body::from("late")));
            });
            Ok(rx.await.expect("worker sends a response"))
        }

        let svc = ServiceBuilder::new()
            .layer(layer(Some("localhost")))
            .service_fn(deferred);
        let res = svc.oneshot(Request::new(Body::empty())).await.unwrap();
        assert_eq!(res.headers().get_all(header::SET_COOKIE).iter().count(), 1);
        assert_eq!(body_text(res).await, "late");
    }

    #[tokio::test]
    async fn handler_cookies_are_preserved() {
        async fn with_cookie(req: Request<Body>) -> Result<Response<Body>, Infallible> {
            session_of(&req).insert("test", 1).unwrap();
            let mut res = Response::new(Body::empty());
            res.headers_mut()
                .insert(header::SET_COOKIE, HeaderValue::from_static("theme=dark"));
            Ok(res)
        }

        let svc = ServiceBuilder::new()
            .layer(layer(Some("localhost")))
            .service_fn(with_cookie);
        let res = svc.oneshot(Request::new(Body::empty())).await.unwrap();
        assert_eq!(res.headers().get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[tokio::test]
    async fn inner_errors_propagate_without_cookie() {
        async fn failing(req: Request<Body>) -> Result<Response<Body>, &'static str> {
            session_of(&req).insert("test", 1).unwrap();
            Err("boom")
        }

        let svc = ServiceBuilder::new()
            .layer(layer(Some("localhost")))
            .service_fn(failing);
        let err = svc.oneshot(Request::new(Body::empty())).await.unwrap_err();
        assert_eq!(err, "boom");
    }

    #[tokio::test]
    async fn concurrent_requests_are_isolated() {
        async fn tag_request(req: Request<Body>) -> Result<Response<Body>, Infallible> {
            let session = session_of(&req);
            let user = req.headers()["x-user"].to_str().unwrap().to_owned();
            assert!(session.get::<String>("user").is_none());
            tokio::task::yield_now().await;
            session.insert("user", &user).unwrap();
            Ok(Response::new(Body::empty()))
        }

        let svc = ServiceBuilder::new()
            .layer(layer(Some("localhost")))
            .service_fn(tag_request);
        let request = |user: &str| {
            Request::builder()
                .header("x-user", user)
                .body(Body::empty())
                .unwrap()
        };
        let (a, b) = tokio::join!(
            svc.clone().oneshot(request("alice")),
            svc.clone().oneshot(request("bob"))
        );

        let svc = ServiceBuilder::new()
            .layer(layer(Some("localhost")))
            .service_fn(|req: Request<Body>| async move {
                let user = session_of(&req).get::<String>("user");
                Ok::<_, Infallible>(Response::new(Body::from(user.unwrap_or_default())))
            });
        for (res, expected) in [(a.unwrap(), "alice"), (b.unwrap(), "bob")] {
            let cookie = set_cookie(&res).unwrap();
            let req = Request::builder()
                .header(header::COOKIE, cookie_header(&cookie))
                .body(Body::empty())
                .unwrap();
            let res = svc.clone().oneshot(req).await.unwrap();
            assert_eq!(body_text(res).await, expected);
        }
    }

    #[test]
    fn request_host_rules() {
        let host = |h: &str| {
            let req = Request::builder().header(header::HOST, h).body(()).unwrap();
            request_host(&req)
        };
        assert_eq!(host("example.com"), Some("example.com".into()));
        assert_eq!(host("example.com:3000"), Some("example.com".into()));
        assert_eq!(host("10.0.0.1:80"), None);
        assert_eq!(host("[::1]:80"), None);
    }
}
