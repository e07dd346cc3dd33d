//! SeaORM entity models
//!
//! Database entities for the Airwave fleet registry

mod publisher;
mod relay;
mod room;
mod tenant;

pub use tenant::{
    Entity as TenantEntity,
    Model as Tenant,
    ActiveModel as TenantActiveModel,
    Column as TenantColumn,
};

pub use relay::{
    Entity as RelayEntity,
    Model as Relay,
    ActiveModel as RelayActiveModel,
    Column as RelayColumn,
    RelayStatus,
};

pub use room::{
    Entity as RoomEntity,
    Model as Room,
    ActiveModel as RoomActiveModel,
    Column as RoomColumn,
};

pub use publisher::{
    Entity as PublisherEntity,
    Model as Publisher,
    ActiveModel as PublisherActiveModel,
    Column as PublisherColumn,
};
