diesel::table! {
    api_usage (id) {
        id -> Integer,
        endpoint_type -> Text,
        tokens_used -> Integer,
        success -> Bool,
        created_at -> BigInt,
    }
}
