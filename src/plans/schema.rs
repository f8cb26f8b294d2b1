diesel::table! {
    plans (id) {
        id -> Integer,
        user_id -> Text,
        learning_target -> Text,
        total_days -> Integer,
        difficulty -> Text,
        hours_per_day -> Integer,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    daily_missions (id) {
        id -> Integer,
        plan_id -> Integer,
        day_number -> Integer,
        title -> Text,
        description -> Text,
        detailed_content -> Text,
        status -> Text,
        estimated_minutes -> Integer,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
