//! Fixed-window rate limiting keyed by client address.

use actix_service::{forward_ready, Service, Transform};
use actix_web::{
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::{
        header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
        Method,
    },
    Error, ResponseError,
};
use dashmap::DashMap;
use futures::future::{ready, LocalBoxFuture, Ready};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::errors::ApiError;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
    pub message: String,
    /// Key on `Forwarded` / `X-Forwarded-For` instead of the socket peer.
    /// Only safe behind a proxy that overwrites those headers.
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-key request counters. A key's window starts with its first request
/// and resets once `policy.window` has elapsed.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        let mut elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.policy.window {
            window.started = now;
            window.count = 0;
            elapsed = Duration::ZERO;
        }
        let retry_after = self.policy.window - elapsed;

        if window.count >= self.policy.max_requests {
            return Decision {
                allowed: false,
                remaining: 0,
                retry_after,
            };
        }
        window.count += 1;
        Decision {
            allowed: true,
            remaining: self.policy.max_requests - window.count,
            retry_after,
        }
    }

    /// Drops windows that expired before `now`.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, window| now.saturating_duration_since(window.started) < self.policy.window);
    }
}

#[derive(Debug, Clone)]
enum Scope {
    Any,
    Route(Method, String),
}

/// Middleware factory. `RateLimit::any` counts every request passing through
/// it; `RateLimit::route` only counts one method and exact path.
#[derive(Debug, Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    scope: Scope,
}

impl RateLimit {
    pub fn any(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            scope: Scope::Any,
        }
    }

    pub fn route(limiter: Arc<RateLimiter>, method: Method, path: impl Into<String>) -> Self {
        Self {
            limiter,
            scope: Scope::Route(method, path.into()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service,
            limiter: Arc::clone(&self.limiter),
            scope: self.scope.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: S,
    limiter: Arc<RateLimiter>,
    scope: Scope,
}

impl<S> RateLimitMiddleware<S> {
    fn applies(&self, req: &ServiceRequest) -> bool {
        match &self.scope {
            Scope::Any => true,
            Scope::Route(method, path) => req.method() == method && req.path() == path,
        }
    }
}

fn client_key(req: &ServiceRequest, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(addr) = req.connection_info().realip_remote_addr() {
            return addr.to_string();
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn set_limit_headers(headers: &mut HeaderMap, limit: u32, decision: &Decision) {
    headers.insert(HeaderName::from_static(LIMIT_HEADER), HeaderValue::from(limit));
    headers.insert(
        HeaderName::from_static(REMAINING_HEADER),
        HeaderValue::from(decision.remaining),
    );
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !self.applies(&req) {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) });
        }

        let client = client_key(&req, self.limiter.policy().trust_proxy);
        let decision = self.limiter.check(&client);
        let limit = self.limiter.policy().max_requests;

        if !decision.allowed {
            warn!(%client, path = %req.path(), "rate limit exceeded");
            let mut response =
                ApiError::TooManyRequests(self.limiter.policy().message.clone()).error_response();
            let headers = response.headers_mut();
            set_limit_headers(headers, limit, &decision);
            headers.insert(
                RETRY_AFTER,
                HeaderValue::from(decision.retry_after.as_secs().max(1)),
            );
            return Box::pin(ready(Ok(req.into_response(response).map_into_right_body())));
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let mut res = fut.await?;
            set_limit_headers(res.headers_mut(), limit, &decision);
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitPolicy {
            window: Duration::from_secs(window_secs),
            max_requests,
            message: "slow down".to_string(),
            trust_proxy: false,
        })
    }

    #[test]
    fn test_counts_down_then_blocks() {
        let limiter = limiter(2, 60);
        let now = Instant::now();

        let first = limiter.check_at("1.2.3.4", now);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = limiter.check_at("1.2.3.4", now);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.check_at("1.2.3.4", now + Duration::from_secs(10));
        assert!(!third.allowed);
        assert_eq!(third.retry_after, Duration::from_secs(50));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).allowed);
        assert!(!limiter.check_at("a", now + Duration::from_secs(59)).allowed);
        assert!(limiter.check_at("a", now + Duration::from_secs(60)).allowed);
    }

    #[test]
    fn test_purge_keeps_live_windows() {
        let limiter = limiter(5, 60);
        limiter.check("a");
        limiter.purge_expired();
        assert_eq!(limiter.windows.len(), 1);
    }

    async fn created_from_rotating_forwarded_for(trust_proxy: bool) -> usize {
        use actix_web::{test, web, App, HttpResponse};

        let policy = RateLimitPolicy {
            trust_proxy,
            ..limiter(2, 60).policy().clone()
        };
        let app = test::init_service(
            App::new()
                .wrap(RateLimit::any(Arc::new(RateLimiter::new(policy))))
                .route("/", web::post().to(HttpResponse::Created)),
        )
        .await;

        let mut created = 0;
        for i in 0..5 {
            let req = test::TestRequest::post()
                .uri("/")
                .peer_addr(format!("10.0.0.1:{}", 40000 + i).parse().unwrap())
                .insert_header(("X-Forwarded-For", format!("1.2.3.{i}")))
                .to_request();
            if test::call_service(&app, req).await.status().is_success() {
                created += 1;
            }
        }
        created
    }

    #[actix_web::test]
    async fn test_forwarded_headers_ignored_by_default() {
        assert_eq!(created_from_rotating_forwarded_for(false).await, 2);
    }

    #[actix_web::test]
    async fn test_forwarded_headers_used_behind_trusted_proxy() {
        assert_eq!(created_from_rotating_forwarded_for(true).await, 5);
    }
}
