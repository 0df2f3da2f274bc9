// Esquema Diesel compartido por SQLite y Postgres.
// Tablas: documents, signatures, delegates
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    documents (id) {
        id -> Text,
        name -> Text,
        artifact_name -> Text,
        artifact_path -> Text,
        owner_rut -> Text,
        created_at_ts -> BigInt,
        is_fully_signed -> Bool,
        deleted_at_ts -> Nullable<BigInt>,
    }
}
diesel::table! {
    signatures (id) {
        id -> Text,
        document_id -> Text,
        owner_rut -> Text,
        signer_rut -> Nullable<Text>,
        signer_order -> Integer,
        signer_type -> Text,
        is_signed -> Bool,
        signed_at_ts -> Nullable<BigInt>,
    }
}
diesel::table! {
    delegates (id) {
        id -> Text,
        owner_rut -> Text,
        delegate_rut -> Text,
        state -> Text,
        created_at_ts -> BigInt,
        expires_at_ts -> Nullable<BigInt>,
        revoked_at_ts -> Nullable<BigInt>,
    }
}
diesel::joinable!(signatures -> documents (document_id));
allow_tables_to_appear_in_same_query!(documents, signatures, delegates);
