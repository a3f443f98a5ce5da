//! Scenario report

use std::io;

use storefront::{notify::ToastLevel, payment::NavigationTarget, pricing::format_amount};
use tabled::{
    builder::Builder,
    settings::{Alignment, Style, object::Columns},
};

use crate::scenario::{Outcome, Verdict};

/// Print the cart, the order summary and the verdict of a run.
pub(crate) fn write_to(mut out: impl io::Write, outcome: &Outcome) -> io::Result<()> {
    let money = |minor| format_amount(minor, outcome.currency);

    let mut builder = Builder::default();
    builder.push_record(["#", "Product", "Unit Price", "Qty", "Line Total"]);

    for item in &outcome.items {
        builder.push_record([
            item.id.to_string(),
            item.product.name.clone(),
            money(item.product.price),
            item.quantity.to_string(),
            money(item.line_total()),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::modern_rounded());
    table.modify(Columns::new(2..5), Alignment::right());

    writeln!(out, "\n{table}")?;

    let summary = &outcome.summary;

    writeln!(out, "\nSubtotal: {}", money(summary.subtotal))?;

    if let Some(code) = &outcome.coupon {
        writeln!(out, "Discount ({code}): -{}", money(summary.discount))?;
    }

    if summary.free_shipping {
        writeln!(out, "Shipping: free")?;
    } else {
        writeln!(out, "Shipping: {}", money(summary.shipping))?;
    }

    writeln!(out, "Total: {}\n", money(summary.total))?;

    for toast in &outcome.toasts {
        let level = match toast.level {
            ToastLevel::Info => "info",
            ToastLevel::Success => "ok",
            ToastLevel::Error => "error",
        };

        writeln!(out, "[{level}] {} ({})", toast.message, toast.key)?;
    }

    match &outcome.verdict {
        Verdict::Redirected(redirect) => {
            let target = match redirect.target {
                NavigationTarget::TopFrame => "top frame",
                NavigationTarget::CurrentWindow => "current window",
                NavigationTarget::NewTab => "new tab",
            };

            writeln!(out, "Redirected ({target}): {}", redirect.url)
        }
        Verdict::StoppedAt(step, error) => writeln!(out, "Stopped at step {step}: {error}"),
        Verdict::PaymentFailed(error) => writeln!(out, "Payment not started: {error}"),
    }
}
