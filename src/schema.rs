diesel::table! {
    notes (id) {
        id -> Varchar,
        content -> Text,
        password -> Nullable<Varchar>,
    }
}
