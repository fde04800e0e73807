// src/utils/html.rs

/// Clean HTML content using the ammonia library.
///
/// Whitelist-based: safe tags (like <b>, <p>) survive, while <script>,
/// <iframe> and event handler attributes are stripped. Applied to admin
/// authored event and question text before it is stored and shown to
/// participants.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
