use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::manual::submit_manual_request,
        crate::api::manual::decide_manual_request,
        crate::api::checkout::create_checkout,
        crate::api::webhooks::card_webhook,
        crate::api::webhooks::voucher_webhook
    ),
    components(
        schemas(
            crate::api::manual::SubmitManualRequest,
            crate::api::manual::DecideRequest,
            crate::api::checkout::CheckoutRequest,
            crate::reconcile::CardGatewayPayload,
            crate::reconcile::VoucherGatewayPayload,
            crate::reconcile::VoucherOrder,
            crate::models::Tier,
            crate::models::Provider,
            crate::models::ProviderMethod,
            crate::models::ReviewOutcome
        )
    ),
    tags(
        (name = "payments", description = "Checkout attempts and manual proof-of-payment"),
        (name = "review", description = "Reviewer decisions"),
        (name = "webhooks", description = "Gateway callbacks")
    )
)]
pub struct ApiDoc;
