/// Audit-log hooks for user/session lifecycle events (spec §4.7's
/// `UserCreated`/`UserUpdate`/`UserRemoved` emissions, plus the
/// webservice/authentication-outcome log events). The tamper-evident
/// log pipeline (C5) is a sibling crate, not a dependency of this one —
/// `qmc-app` wires a concrete sink in at startup; tests use
/// `NoopUserEventSink`.
pub trait UserEventSink: Send + Sync {
    fn user_created(&self, name: &str);
    fn user_updated(&self, name: &str);
    fn user_removed(&self, name: &str);
    fn user_login(&self, name: &str);
    fn user_logout(&self, name: &str);
    /// A failed authentication attempt against an account that was not
    /// already locked.
    fn login_failure(&self, name: &str);
    /// The account just transitioned into the locked state, or this is
    /// the first rejected attempt observed since it did (spec §4.7's
    /// "only the first failure is logged").
    fn account_suspended(&self, name: &str);
    fn account_resumed(&self, name: &str);
}

pub struct NoopUserEventSink;

impl UserEventSink for NoopUserEventSink {
    fn user_created(&self, _name: &str) {}
    fn user_updated(&self, _name: &str) {}
    fn user_removed(&self, _name: &str) {}
    fn user_login(&self, _name: &str) {}
    fn user_logout(&self, _name: &str) {}
    fn login_failure(&self, _name: &str) {}
    fn account_suspended(&self, _name: &str) {}
    fn account_resumed(&self, _name: &str) {}
}
