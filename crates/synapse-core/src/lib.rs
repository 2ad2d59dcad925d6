pub mod bus;
pub mod clock;
pub mod constants;
pub mod dispute;
pub mod error;
pub mod escrow;
pub mod events;
pub mod ids;
pub mod intent;
pub mod oracle;
pub mod types;

pub use bus::{EventBus, SubscriptionId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use constants::*;
pub use dispute::{
    Dispute, DisputeReason, DisputeStatus, Evidence, EvidenceSubmitter, OpenDisputeRequest,
    Resolution, SlashingRecord, Verdict,
};
pub use error::SynapseError;
pub use escrow::{EscrowAccount, EscrowAdapter, InMemoryEscrow, SlashReceipt};
pub use events::{BreakerState, Event, RateLimitKind, SafetyEvent};
pub use ids::{IdSource, RandomIds, SequentialIds};
pub use intent::{
    Bid, BidStatus, BidSubmission, CreateIntentRequest, Intent, IntentReader, IntentRequirements,
    IntentResult, IntentStatus, ProviderInfo, ResultSubmission,
};
pub use oracle::{ReferenceOracle, StaticOracle, UnavailableOracle};
pub use types::*;
