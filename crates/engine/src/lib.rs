//! The transactional core: state machine, catalog, and the idempotent
//! order/offer services that sit on top of `storage` and `adapters`.

pub mod catalog;
pub mod offer_manager;
pub mod order_service;
pub mod state_machine;
pub mod time;

pub use catalog::{ProductCatalog, StaticCatalog};
pub use offer_manager::{AcceptTaskResponse, ExpirySweepResult, OfferManager, DEFAULT_OFFER_TTL_MS};
pub use order_service::{
	CreateOrderItemRequest, CreateOrderRequest, CreateOrderResponse, DeliverConfirmRequest,
	DeliverConfirmResponse, DoorstepIdCheckResponse, GpsPoint, MerchantAcceptancePolicy,
	OrderService, OrderServiceConfig, RefuseResponse, VerifyAgeResponse,
};
pub use state_machine::{transition, try_transition, InvalidStateTransition};
