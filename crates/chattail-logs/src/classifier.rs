use chattail_types::Category;

/// Signature shared by field-based classifiers: `(sender, display_name)`
pub type ClassifyFn = fn(Option<&str>, Option<&str>) -> Category;

/// Derive a category from which fields an entry carries.
///
/// | sender | display name | category          |
/// |--------|--------------|-------------------|
/// | yes    | yes          | clan_chat         |
/// | yes    | no           | clan_announcement |
/// | no     | yes          | player_message    |
/// | no     | no           | game_message      |
pub fn classify(sender: Option<&str>, display_name: Option<&str>) -> Category {
    match (is_present(sender), is_present(display_name)) {
        (true, true) => Category::ClanChat,
        (true, false) => Category::ClanAnnouncement,
        (false, true) => Category::PlayerMessage,
        (false, false) => Category::GameMessage,
    }
}

/// Resolve an entry's category; an explicit source code always wins over
/// the field-based fallback.
pub fn resolve_category(
    code: Option<&str>,
    sender: Option<&str>,
    display_name: Option<&str>,
    classify: ClassifyFn,
) -> Category {
    code.and_then(Category::from_code)
        .unwrap_or_else(|| classify(sender, display_name))
}

fn is_present(field: Option<&str>) -> bool {
    field.is_some_and(|text| !text.is_empty())
}
