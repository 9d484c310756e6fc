//! Text of the messages the bot sends.

use vault::ProofRejection;

/// Direct message sent once content is stored.
pub fn ingestion_receipt(bot_username: &str, resource_id: &str, proof: &str) -> String {
    format!(
        "✅ Content received and encrypted!\n\
         \n\
         📝 Resource ID: {resource_id}\n\
         🔐 Proof: {proof}\n\
         \n\
         To publish and monetize your content, tweet:\n\
         \n\
         @{bot_username} lock:0.2 id:{resource_id} proof:{proof}\n\
         \n\
         (You can customize the price, e.g., lock:1.5 for $1.50)"
    )
}

/// Public reply under the post that published a resource.
pub fn publication_notice(payment_link: &str, price: &str, currency: &str) -> String {
    format!(
        "🔒 Paywalled Content! Pay ${price} {currency} (x402 payment) to access:\n\
         \n\
         {payment_link}\n\
         \n\
         - Powered by proofgate ⚡️"
    )
}

/// Public reply explaining why a proof was not accepted.
pub fn rejection_notice(rejection: ProofRejection) -> &'static str {
    match rejection {
        ProofRejection::NotFound => "Invalid resource ID. Please check and try again.",
        ProofRejection::AlreadyUsed => "This content is already published.",
        ProofRejection::InvalidToken => "Invalid proof. Please check your proof token.",
        ProofRejection::WrongStatus => "This content can no longer be published.",
    }
}
