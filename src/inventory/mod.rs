//! Stones, slabs and the sink/faucet catalogs.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub mod fixtures;
pub mod slabs;
pub mod stones;

pub use fixtures::{faucets, sinks};
pub use slabs::{find_slab, Slab};
pub use stones::{find_stone, Stone};

pub fn configure_inventory_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::STONES, get(stones::list_stones).post(stones::create_stone))
        .route(
            ApiUrls::STONE_BY_ID,
            get(stones::get_stone)
                .put(stones::update_stone)
                .delete(stones::delete_stone),
        )
        .route(ApiUrls::STONE_IMAGE, post(stones::upload_stone_image))
        .route(
            ApiUrls::STONE_SLABS,
            get(slabs::list_slabs).post(slabs::add_slabs),
        )
        .route(
            ApiUrls::SLAB_BY_ID,
            get(slabs::get_slab)
                .put(slabs::update_slab)
                .delete(slabs::delete_slab),
        )
        .route(ApiUrls::SLAB_IMAGE, post(slabs::upload_slab_image))
        .route(ApiUrls::SINK_TYPES, get(sinks::list_types).post(sinks::create_type))
        .route(
            ApiUrls::SINK_TYPE_BY_ID,
            get(sinks::get_type)
                .put(sinks::update_type)
                .delete(sinks::delete_type),
        )
        .route(
            ApiUrls::SINK_TYPE_UNITS,
            post(sinks::add_units).delete(sinks::remove_unit),
        )
        .route(ApiUrls::SINK_TYPE_IMAGE, post(sinks::upload_image))
        .route(
            ApiUrls::FAUCET_TYPES,
            get(faucets::list_types).post(faucets::create_type),
        )
        .route(
            ApiUrls::FAUCET_TYPE_BY_ID,
            get(faucets::get_type)
                .put(faucets::update_type)
                .delete(faucets::delete_type),
        )
        .route(
            ApiUrls::FAUCET_TYPE_UNITS,
            post(faucets::add_units).delete(faucets::remove_unit),
        )
        .route(ApiUrls::FAUCET_TYPE_IMAGE, post(faucets::upload_image))
}
