pub mod anilist;
pub mod qbittorrent;
pub mod sources;
