//! External integration interfaces.
//!
//! AgentPin credential verification is the only external-security
//! integration this runtime still carries; it grounds the shape of the
//! Authorization Adapter's external-authorizer seam (`runtime::policy::authz`).

pub mod agentpin;

pub use agentpin::{
    AgentPinConfig, AgentPinError, AgentPinKeyStore, AgentPinVerifier, AgentVerificationResult,
    DefaultAgentPinVerifier, MockAgentPinVerifier,
};
