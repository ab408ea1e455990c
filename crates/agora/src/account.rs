// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `agora login`, `register`, `logout` and `whoami`.

use agora_core::AgoraError;
use agora_core::types::Registration;
use agora_engine::FeedEngine;

fn read_password(prompt: &str) -> Result<String, AgoraError> {
    rpassword::prompt_password(prompt)
        .map_err(|e| AgoraError::InvalidInput(format!("cannot read password: {e}")))
}

pub async fn login(engine: &FeedEngine, identifier: &str) -> Result<(), AgoraError> {
    let password = read_password("Password: ")?;
    let user = engine.login(identifier, &password).await?;
    println!("signed in as {} ({})", user.display_name, user.role);
    Ok(())
}

pub async fn register(
    engine: &FeedEngine,
    nickname: String,
    student_id: Option<String>,
) -> Result<(), AgoraError> {
    let password = read_password("Choose a password: ")?;
    let confirm = read_password("Repeat it: ")?;
    if password != confirm {
        return Err(AgoraError::InvalidInput("passwords do not match".into()));
    }
    engine
        .register(&Registration {
            nickname,
            password,
            student_id,
        })
        .await?;
    println!("account created, run `agora login` to sign in");
    Ok(())
}

pub async fn logout(engine: &FeedEngine) -> Result<(), AgoraError> {
    if engine.session().is_anonymous() {
        println!("not signed in");
        return Ok(());
    }
    engine.logout().await?;
    println!("signed out");
    Ok(())
}

pub async fn whoami(engine: &FeedEngine) -> Result<(), AgoraError> {
    match engine.refresh_me().await? {
        Some(user) => println!("{} ({}, id {})", user.display_name, user.role, user.id),
        None => println!("not signed in"),
    }
    Ok(())
}
