#[rocket::launch]
fn rocket() -> _ {
    // Builds the logger, so nothing can be logged before this call
    let rocket = auth_api::rocket();
    log::info!("starting auth API server");
    rocket
}
