pub mod blocked_ip;
pub mod click_event;
pub mod site;

pub use blocked_ip::Entity as BlockedIpEntity;
pub use click_event::Entity as ClickEventEntity;
pub use site::Entity as SiteEntity;
