// Habitual schema - habit tracker tables for Diesel ORM

diesel::table! {
    schema_versions (id) {
        id -> Integer,
        version -> Text,
        name -> Text,
        features -> Text,
        introduced_at -> Text,
    }
}

diesel::table! {
    users (id) {
        id -> Text,
        name -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    sessions (token) {
        token -> Text,
        user_id -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    habits (seq) {
        seq -> Integer,                  // Insertion order only, never exposed
        id -> Text,                      // UUID
        user_id -> Text,                 // FK to users.id
        name -> Text,
        last_performed -> Text,          // RFC 3339
        done -> Bool,
        streak -> Integer,
        goal -> Integer,
        created_at -> Text,
    }
}

diesel::joinable!(sessions -> users (user_id));
diesel::joinable!(habits -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(users, sessions, habits);
