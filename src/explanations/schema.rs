diesel::table! {
    saved_explanations (id) {
        id -> Integer,
        user_id -> Text,
        query -> Text,
        explanation -> Text,
        tags -> Text,
        difficulty -> Text,
        created_at -> BigInt,
    }
}
