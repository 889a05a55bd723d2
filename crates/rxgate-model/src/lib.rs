pub mod remote;
pub mod resilient;
pub mod rules;

pub use remote::RemoteModelProvider;
pub use resilient::ResilientProvider;
pub use rules::RuleBasedProvider;
