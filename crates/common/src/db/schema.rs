//! Schema bootstrap derived from the entity definitions
//!
//! Tables are created in dependency order and are idempotent, so every
//! gateway instance can run this on startup.

use super::models::*;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};

pub(super) async fn create_all(conn: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(conn, TenantEntity).await?;
    create_table(conn, RelayEntity).await?;
    create_table(conn, RoomEntity).await?;
    create_table(conn, PublisherEntity).await?;

    for index in indexes() {
        let backend = conn.get_database_backend();
        conn.execute(backend.build(&index)).await?;
    }

    Ok(())
}

async fn create_table<E: EntityTrait>(conn: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    conn.execute(backend.build(&stmt)).await?;
    Ok(())
}

fn indexes() -> Vec<IndexCreateStatement> {
    vec![
        // Room names are unique per tenant
        Index::create()
            .name("idx_rooms_tenant_name")
            .table(RoomEntity)
            .col(RoomColumn::TenantId)
            .col(RoomColumn::Name)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_relays_tenant")
            .table(RelayEntity)
            .col(RelayColumn::TenantId)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_publishers_room")
            .table(PublisherEntity)
            .col(PublisherColumn::RoomId)
            .if_not_exists()
            .to_owned(),
    ]
}
