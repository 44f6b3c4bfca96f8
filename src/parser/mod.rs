pub mod filename;

pub use filename::{
    alias_match_score, extract_episode_no, extract_episode_range, extract_season_no,
    has_explicit_episode_signal, is_bad_release, normalize_title, score_release,
};
