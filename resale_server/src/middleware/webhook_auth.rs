//! Authentication middleware for the payment webhook and the operator API.
//!
//! A request is let through if it carries either
//! * the static API key, in the configured API key header (`Authorization` by default), as `Apikey <key>` or the bare
//!   key, or
//! * a base64 HMAC-SHA256 signature of the raw request body, keyed with the webhook secret, in the signature header
//!   (`X-Signature` by default). Signatures are only accepted where the factory allows them.
//!
//! Anything else is rejected with `403 Forbidden` before the handler runs. Unset credentials never match.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::{
    config::WebhookAuthConfig,
    errors::{AuthError, ServerError},
    helpers::{calculate_hmac, constant_time_eq},
};

const API_KEY_PREFIX: &str = "apikey ";

pub struct WebhookAuthMiddlewareFactory {
    config: WebhookAuthConfig,
    allow_signature: bool,
}

impl WebhookAuthMiddlewareFactory {
    pub fn new(config: WebhookAuthConfig, allow_signature: bool) -> Self {
        WebhookAuthMiddlewareFactory { config, allow_signature }
    }
}

impl<S, B> Transform<S, ServiceRequest> for WebhookAuthMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = WebhookAuthMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(WebhookAuthMiddlewareService {
            config: self.config.clone(),
            allow_signature: self.allow_signature,
            service: Rc::new(service),
        }))
    }
}

pub struct WebhookAuthMiddlewareService<S> {
    config: WebhookAuthConfig,
    allow_signature: bool,
    service: Rc<S>,
}

/// True if the header value carries the configured API key, with or without the `Apikey` scheme.
pub fn api_key_matches(header_value: &str, api_key: &str) -> bool {
    if api_key.trim().is_empty() {
        return false;
    }
    let value = header_value.trim();
    let presented = match value.get(..API_KEY_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(API_KEY_PREFIX) => value[API_KEY_PREFIX.len()..].trim(),
        _ => value,
    };
    constant_time_eq(presented, api_key)
}

impl<S, B> Service<ServiceRequest> for WebhookAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let config = self.config.clone();
        let allow_signature = self.allow_signature;
        Box::pin(async move {
            trace!("🔐️ Authenticating request to {}", req.path());
            let api_key = req.headers().get(&config.api_key_header).and_then(|v| v.to_str().ok()).map(String::from);
            if let Some(key) = &api_key {
                if api_key_matches(key, config.api_key.reveal()) {
                    trace!("🔐️ API key check ✅️");
                    return service.call(req).await;
                }
            }
            let signature =
                req.headers().get(&config.signature_header).and_then(|v| v.to_str().ok()).map(|s| s.trim().to_string());
            match signature {
                Some(signature) if allow_signature => {
                    let data = req.extract::<web::Bytes>().await.map_err(|e| {
                        warn!("🔐️ Failed to extract request data: {e:?}");
                        ServerError::InvalidRequestBody(e.to_string())
                    })?;
                    let expected = config
                        .hmac_secret
                        .is_set()
                        .then(|| calculate_hmac(config.hmac_secret.reveal(), data.as_ref()))
                        .flatten();
                    match expected {
                        Some(expected) if constant_time_eq(&signature, &expected) => {
                            trace!("🔐️ Signature check ✅️");
                            req.set_payload(bytes_to_payload(data));
                            service.call(req).await
                        },
                        _ => {
                            warn!("🔐️ Invalid signature on request to {}. Denying access.", req.path());
                            Err(ServerError::from(AuthError::InvalidSignature).into())
                        },
                    }
                },
                _ if api_key.is_some() => {
                    warn!("🔐️ Invalid API key on request to {}. Denying access.", req.path());
                    Err(ServerError::from(AuthError::InvalidApiKey).into())
                },
                _ => {
                    warn!("🔐️ No credentials on request to {}. Denying access.", req.path());
                    Err(ServerError::from(AuthError::MissingCredentials).into())
                },
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
