mod webhook_auth;

pub use webhook_auth::{api_key_matches, WebhookAuthMiddlewareFactory, WebhookAuthMiddlewareService};
