pub mod blocked;
pub mod health;
pub mod stats;
pub mod track;

pub use blocked::{BlockedService, blocked_routes};
pub use health::{AppStartTime, HealthService, health_routes};
pub use stats::{StatsService, stats_routes};
pub use track::{TrackService, track_routes};

use actix_web::web;

/// `/api` 下的全部业务路由
pub fn api_routes() -> actix_web::Scope {
    web::scope("/api")
        .service(track_routes())
        .service(blocked_routes())
        .service(stats_routes())
}
