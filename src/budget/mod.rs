pub mod bridge;
pub mod factory;
pub mod key_generators;
pub mod traits;
pub mod unit;

pub use bridge::{
    BridgeError, InMemoryPrivacyBudgetingServiceBridge,
    PrivacyBudgetingServiceBridge,
};
pub use factory::PrivacyBudgetKeyGeneratorFactory;
pub use traits::{
    KeyGenerationError, PrivacyBudgetKeyGenerator, PrivacyBudgetKeyInput,
};
pub use unit::PrivacyBudgetUnit;
