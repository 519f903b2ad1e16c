//! Esquema Diesel de las tablas de sync-persistence.

diesel::table! {
    sync_checkpoints (id) {
        id -> Uuid,
        kind -> Text,
        job_id -> Text,
        table_name -> Nullable<Text>,
        position -> Jsonb,
        snapshot -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}
