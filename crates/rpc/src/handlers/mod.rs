pub mod health;
pub mod ingress;
pub mod states;
pub mod subscriptions;
