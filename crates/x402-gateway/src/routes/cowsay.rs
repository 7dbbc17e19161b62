use actix_web::{get, web, HttpRequest, HttpResponse};
use x402_proto::header;

use crate::error::GatewayError;
use crate::gate::{self, GateOutcome, ProtectedResource};
use crate::rate_limit;
use crate::state::AppState;

const RESOURCE: ProtectedResource = ProtectedResource {
    route: "/api/cowsays",
    description: "cowsay ASCII art",
    mime_type: "application/json",
    // 0.001 USDC (6 decimals)
    amount: "1000",
};

const MAX_WIDTH: usize = 40;

fn word_wrap(text: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= max_width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn cowsay(text: &str) -> String {
    let mut lines = word_wrap(text, MAX_WIDTH);
    if lines.is_empty() {
        lines.push(String::new());
    }
    let box_width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    let bubble = if lines.len() == 1 {
        format!(
            " {}\n< {} >\n {}",
            "_".repeat(box_width + 2),
            lines[0],
            "‾".repeat(box_width + 2),
        )
    } else {
        let mut out = vec![format!(" {}", "_".repeat(box_width + 2))];
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            let padded = format!("{line:<box_width$}");
            out.push(match i {
                0 => format!("/ {padded} \\"),
                i if i == last => format!("\\ {padded} /"),
                _ => format!("| {padded} |"),
            });
        }
        out.push(format!(" {}", "-".repeat(box_width + 2)));
        out.join("\n")
    };

    const COW: &str = r"        \   ^__^
         \  (oo)\_______
            (__)\       )\/\
                ||----w |
                ||     ||";

    format!("{bubble}\n{COW}")
}

#[get("/api/cowsays")]
pub async fn cowsays(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    rate_limit::enforce(&req, RESOURCE.route, &state.limiter).await?;

    match gate::require_payment(&req, &RESOURCE, &state).await? {
        GateOutcome::Challenge(challenge) => gate::challenge_response(&challenge),
        GateOutcome::Paid { settlement, .. } => {
            let art = cowsay(super::pick_quote());
            let receipt = header::encode_payment_response(&settlement)
                .map_err(|e| GatewayError::Internal(e.to_string()))?;

            Ok(HttpResponse::Ok()
                .insert_header((header::PAYMENT_RESPONSE, receipt))
                .json(serde_json::json!({
                    "cowsay": art,
                    "tx": settlement.transaction,
                    "network": settlement.network,
                })))
        }
    }
}
