//! Line-based driver for the registration wizard.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use eventreg_core::models::{open_for_registration, MemberField};
use eventreg_core::registration::{
    Availability, NoticeLevel, Progress, RegistrationWizard, WizardEvent, WizardSettings,
    WizardStep, MAX_TEAM_MEMBERS,
};
use eventreg_core::{ApiClient, Config, ModuleName};

/// Extra wait past the debounce so the probe has started before we watch it.
const PROBE_GRACE_MS: u64 = 50;

type Wizard = RegistrationWizard<ApiClient>;

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    let read = io::stdin().read_line(&mut input)?;
    if read == 0 {
        anyhow::bail!("Input closed");
    }
    Ok(input.trim().to_string())
}

/// Prompt with the current value shown; an empty answer keeps it.
fn prompt_with_default(label: &str, current: &str) -> Result<String> {
    let answer = if current.is_empty() {
        prompt(&format!("{}: ", label))?
    } else {
        prompt(&format!("{} [{}]: ", label, current))?
    };
    Ok(if answer.is_empty() { current.to_string() } else { answer })
}

fn show_notice(wizard: &Wizard) {
    if let Some(notice) = wizard.notice() {
        let tag = match notice.level {
            NoticeLevel::Info => "i",
            NoticeLevel::Success => "✓",
            NoticeLevel::Error => "✗",
        };
        println!("{} {}", tag, notice.message);
    }
}

pub async fn run(client: ApiClient, config: &Config) -> Result<()> {
    let events = client.fetch_events().await.context("Failed to load events")?;
    let open = open_for_registration(&events);
    if open.is_empty() {
        println!("No events are open for registration.");
        return Ok(());
    }

    println!("\n=== Events open for registration ===\n");
    for (i, event) in open.iter().enumerate() {
        println!("{}. {} ({})", i + 1, event.title, event.schedule_display());
    }
    let choice = prompt("\nEvent number: ")?;
    let event = choice
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| open.get(i))
        .map(|e| (*e).clone())
        .ok_or_else(|| anyhow::anyhow!("No such event: {}", choice))?;

    let settings = WizardSettings::from(config);
    let mut wizard = RegistrationWizard::new(Arc::new(client), settings);
    if wizard.open(event).is_err() {
        show_notice(&wizard);
        return Ok(());
    }

    while wizard.step().is_open() {
        let step = wizard.step();
        if let Some(n) = step.number() {
            println!("\n--- Step {} of 3: {} ---", n, step.title());
        }
        match step {
            WizardStep::TeamDetails => team_details(&mut wizard, settings).await?,
            WizardStep::ModuleSelection => module_selection(&mut wizard).await?,
            WizardStep::Payment => payment(&mut wizard).await?,
            WizardStep::Closed => break,
        }
    }
    Ok(())
}

async fn team_details(wizard: &mut Wizard, settings: WizardSettings) -> Result<()> {
    let current = wizard.draft().map(|d| d.team_name().to_string()).unwrap_or_default();
    let name = prompt_with_default("Team name", &current)?;
    wizard.set_team_name(&name)?;

    for index in 0..MAX_TEAM_MEMBERS {
        if index > 0 {
            let answer = prompt(&format!("Add member {}? [y/N]: ", index + 1))?;
            if !answer.eq_ignore_ascii_case("y") {
                continue;
            }
        }
        println!("Member {}{}", index + 1, if index == 0 { " (team lead)" } else { "" });
        for field in MemberField::ALL {
            let current = wizard
                .draft()
                .and_then(|d| d.members().get(index))
                .map(|m| m.field(field).to_string())
                .unwrap_or_default();
            let value = prompt_with_default(&format!("  {}", field.label()), &current)?;
            wizard.update_member(index, field, &value)?;
        }
    }

    wait_for_name_check(wizard, settings).await;
    match wizard.name_check().availability {
        Availability::Available => println!("✓ Team name is available"),
        Availability::Taken => println!("✗ Team name is already taken"),
        Availability::Unknown => {}
    }

    step_command(wizard, "[n]ext  [c]ancel: ").await
}

async fn wait_for_name_check(wizard: &Wizard, settings: WizardSettings) {
    let mut rx = wizard.subscribe_name_check();
    tokio::time::sleep(settings.team_name_debounce + Duration::from_millis(PROBE_GRACE_MS)).await;
    while rx.borrow_and_update().checking {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

async fn module_selection(wizard: &mut Wizard) -> Result<()> {
    let Some(draft) = wizard.draft() else {
        return Ok(());
    };
    let event = draft.event().clone();
    for (i, module) in event.modules.iter().enumerate() {
        let mark = if draft.is_selected(module) { "x" } else { " " };
        let discount = wizard
            .discounts()
            .get(module)
            .map(|d| format!("  ({}: {})", d.code, d.message))
            .unwrap_or_default();
        println!("[{}] {}. {} - {} PKR{}", mark, i + 1, module, event.price_of(module), discount);
    }
    if let Some(quote) = wizard.quote() {
        println!("Total: {} PKR   Payable: {} PKR", quote.total, quote.payable);
    }

    let command = prompt("<n> toggle  d <n> <code> discount  [n]ext  [b]ack  [c]ancel: ")?;
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("d"), Some(index), code) => {
            let Some(module) = module_at(&event.modules, index) else {
                println!("✗ No module {}", index);
                return Ok(());
            };
            if wizard.validate_discount(&module, code.unwrap_or("")).is_ok() {
                if let Some(event) = wizard.next_event().await {
                    debug!(?event, "Discount result");
                }
            }
            show_notice(wizard);
            Ok(())
        }
        (Some(index), None, None) if index.parse::<usize>().is_ok() => {
            match module_at(&event.modules, index) {
                Some(module) => {
                    let _ = wizard.toggle_module(&module);
                    show_notice(wizard);
                }
                None => println!("✗ No module {}", index),
            }
            Ok(())
        }
        _ => run_command(wizard, &command).await,
    }
}

fn module_at(modules: &[ModuleName], index: &str) -> Option<ModuleName> {
    index
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| modules.get(i))
        .cloned()
}

async fn payment(wizard: &mut Wizard) -> Result<()> {
    if let Some(quote) = wizard.quote() {
        for line in &quote.lines {
            println!("{}: {} PKR (discount {})", line.module, line.due, line.discount);
        }
        println!("Amount to pay: {} PKR", quote.payable);
    }

    let current = wizard
        .payment()
        .receipt
        .as_ref()
        .map(|r| r.file_name().to_string())
        .unwrap_or_default();
    let path = prompt_with_default("Receipt file (pdf/jpg/png, max 2 MB)", &current)?;
    if path != current && !path.is_empty() && wizard.attach_receipt_from_path(&path).await.is_err() {
        show_notice(wizard);
    }

    let current = wizard.payment().transaction_id.clone();
    let transaction_id = prompt_with_default("Transaction ID", &current)?;
    wizard.set_transaction_id(&transaction_id)?;

    step_command(wizard, "[s]ubmit  [b]ack  [c]ancel: ").await
}

async fn step_command(wizard: &mut Wizard, label: &str) -> Result<()> {
    let command = prompt(label)?;
    run_command(wizard, &command).await
}

async fn run_command(wizard: &mut Wizard, command: &str) -> Result<()> {
    let progress = match command {
        "n" | "s" => wizard.advance(),
        "b" => wizard.back(),
        "c" => Ok(wizard.cancel()),
        _ => {
            println!("Unknown command: {}", command);
            return Ok(());
        }
    };

    if let Ok(Progress::Submitting(_)) = progress {
        println!("Submitting...");
        while let Some(event) = wizard.next_event().await {
            let settled = matches!(
                event,
                WizardEvent::Registered(_)
                    | WizardEvent::RegistrationFailed { .. }
                    | WizardEvent::PaymentSubmitted(_)
                    | WizardEvent::PaymentFailed { .. }
            );
            if settled {
                break;
            }
        }
    }
    show_notice(wizard);
    Ok(())
}
