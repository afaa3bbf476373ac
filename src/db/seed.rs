use crate::config::BootstrapAdmin;
use crate::db::Store;
use crate::domain::models::{FieldType, FormKind, NewFormDefinition, NewFormField, NewUser, UserRole};
use anyhow::Result;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};

struct SeedField<'a> {
    key: &'a str,
    label: &'a str,
    field_type: FieldType,
    required: bool,
    choices: &'a str,
}

const fn seed_field<'a>(
    key: &'a str,
    label: &'a str,
    field_type: FieldType,
    required: bool,
    choices: &'a str,
) -> SeedField<'a> {
    SeedField {
        key,
        label,
        field_type,
        required,
        choices,
    }
}

struct SeedForm<'a> {
    name: &'a str,
    description: &'a str,
    kind: FormKind,
    fields: &'a [SeedField<'a>],
}

// Keys match the diabetes assessment form so its field order can drive that form.
const HEALTH_CHECK_FIELDS: &[SeedField<'static>] = &[
    seed_field("forename", "Forename", FieldType::Text, true, ""),
    seed_field("surname", "Surname", FieldType::Text, true, ""),
    seed_field("gender", "Gender", FieldType::Choice, true, "F\nM"),
    seed_field("ethnicity", "Ethnicity", FieldType::Choice, true, "WHITE\nOTHER"),
    seed_field("postcode", "Postcode", FieldType::Text, false, ""),
    seed_field("gp", "GP", FieldType::Text, false, ""),
    seed_field("age", "Age", FieldType::Number, true, ""),
    seed_field("systolic", "Systolic", FieldType::Number, false, ""),
    seed_field("diastolic", "Diastolic", FieldType::Number, false, ""),
    seed_field("pulse", "Pulse", FieldType::Number, false, ""),
    seed_field("waist_cm", "Waist (cm)", FieldType::Decimal, true, ""),
    seed_field("height_cm", "Height (cm)", FieldType::Number, true, ""),
    seed_field("weight_kg", "Weight (kg)", FieldType::Decimal, true, ""),
    seed_field("family_history", "Family history of diabetes", FieldType::Choice, true, "YES\nNO"),
    seed_field("high_bp", "High blood pressure", FieldType::Choice, true, "YES\nNO"),
];

const COFFEE_FIELDS: &[SeedField<'static>] = &[
    seed_field("date", "Date", FieldType::Date, true, ""),
    seed_field("venue", "Venue", FieldType::Text, true, ""),
    seed_field("attendees", "Attendees", FieldType::Number, true, ""),
    seed_field("topic", "Topic", FieldType::Text, false, ""),
    seed_field("follow_up", "Follow-up needed", FieldType::Choice, false, "Yes\nNo"),
];

const SYSTEM_FORMS: &[SeedForm<'static>] = &[
    SeedForm {
        name: "Health Check",
        description: "Health check and diabetes risk capture",
        kind: FormKind::Healthcheck,
        fields: HEALTH_CHECK_FIELDS,
    },
    SeedForm {
        name: "Coffee Morning",
        description: "Coffee morning attendance",
        kind: FormKind::Coffee,
        fields: COFFEE_FIELDS,
    },
];

pub async fn seed_all(store: &dyn Store, admin: Option<&BootstrapAdmin>) -> Result<()> {
    seed_system_forms(store).await?;
    if let Some(admin) = admin {
        seed_admin(store, admin).await?;
    }
    Ok(())
}

pub fn hash_code(code: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(code.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

async fn seed_system_forms(store: &dyn Store) -> Result<()> {
    let existing = store.list_definitions(None).await?;
    for form in SYSTEM_FORMS {
        if existing.iter().any(|d| d.is_system && d.kind == form.kind) {
            continue;
        }
        let def = store
            .insert_definition(NewFormDefinition {
                name: form.name.to_string(),
                description: form.description.to_string(),
                kind: form.kind,
                is_system: true,
                created_by: None,
            })
            .await?;
        for field in form.fields {
            store
                .insert_field(NewFormField {
                    form_id: def.id,
                    key: field.key.to_string(),
                    label: field.label.to_string(),
                    field_type: field.field_type,
                    required: field.required,
                    choices_text: field.choices.to_string(),
                    is_displayed: true,
                })
                .await?;
        }
        tracing::info!("Seeded system form {} ({} fields)", form.name, form.fields.len());
    }
    Ok(())
}

async fn seed_admin(store: &dyn Store, admin: &BootstrapAdmin) -> Result<()> {
    if store.find_login(&admin.email).await?.is_some() {
        return Ok(());
    }
    let user = store
        .insert_user(NewUser {
            email: admin.email.clone(),
            display_name: admin.name.clone(),
            hash: hash_code(&admin.code)?,
            role: Some(UserRole::Admin),
            is_superuser: true,
        })
        .await?;
    tracing::info!("Seeded bootstrap admin {}", user.id);
    Ok(())
}
