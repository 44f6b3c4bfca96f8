pub mod episode;
pub mod release;
pub mod show;
pub mod show_alias;
pub mod show_profile;

pub use episode::Entity as Episode;
pub use release::Entity as Release;
pub use show::Entity as Show;
pub use show_alias::Entity as ShowAlias;
pub use show_profile::Entity as ShowProfile;
