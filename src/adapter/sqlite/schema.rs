//! Diesel table definitions matching the embedded migrations.

diesel::table! {
    generators (address) {
        address -> Text,
        is_active -> Integer,
        registered_at -> Text,
        tx_hash -> Nullable<Text>,
    }
}

diesel::table! {
    consumers (address) {
        address -> Text,
        encrypted_address -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    subscriptions (id) {
        id -> Text,
        generator_address -> Text,
        consumer_address -> Text,
        fee_amount -> Text,
        subscribed_at -> Text,
        expires_at -> Text,
        is_active -> Integer,
        encrypted_address -> Nullable<Text>,
        tx_hash -> Nullable<Text>,
    }
}

diesel::table! {
    strategies (id) {
        id -> Text,
        generator_address -> Text,
        name -> Text,
        protocol -> Text,
        functions -> Text,
        is_active -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    broadcasts (id) {
        id -> Text,
        strategy_id -> Nullable<Text>,
        generator_address -> Text,
        function_name -> Text,
        protocol -> Text,
        parameters -> Text,
        modifiable_params -> Text,
        contract_address -> Nullable<Text>,
        gas_limit -> Nullable<BigInt>,
        total_cost -> Nullable<Text>,
        network -> Text,
        correlation_id -> Text,
        broadcast_at -> Text,
        expires_at -> Text,
    }
}

diesel::table! {
    confirmations (id) {
        id -> Text,
        broadcast_id -> Text,
        consumer_address -> Text,
        original_parameters -> Text,
        modified_parameters -> Text,
        status -> Text,
        gas_price -> Nullable<Text>,
        transaction_hash -> Nullable<Text>,
        gas_used -> Nullable<BigInt>,
        error_message -> Nullable<Text>,
        received_at -> Text,
        decided_at -> Nullable<Text>,
        executed_at -> Nullable<Text>,
    }
}

diesel::table! {
    deliveries (id) {
        id -> Text,
        broadcast_id -> Nullable<Text>,
        strategy_id -> Nullable<Text>,
        consumer_address -> Text,
        event_name -> Text,
        payload -> Text,
        status -> Text,
        retry_count -> Integer,
        queued_at -> Text,
        last_attempt_at -> Nullable<Text>,
        delivered_at -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(broadcasts, confirmations);
diesel::allow_tables_to_appear_in_same_query!(subscriptions, broadcasts);
