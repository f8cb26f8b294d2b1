diesel::table! {
    knowledge_items (id) {
        id -> Integer,
        user_id -> Text,
        plan_id -> Nullable<Integer>,
        item_type -> Text,
        term -> Text,
        definition -> Text,
        created_at -> BigInt,
    }
}
