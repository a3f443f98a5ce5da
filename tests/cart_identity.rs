//! Cart persistence across sign-in and sign-out.

use std::sync::Arc;

use storefront::{
    cache::{CART_KEY, KeyValueCache, MemoryCache},
    config::CheckoutConfig,
    context::{Frontend, StorefrontContext},
    fixtures::Fixture,
    identity::{Identity, SharedIdentity, UserId},
    notify::ToastLog,
    payment::RecordingNavigator,
    products::ProductId,
    services::{RemoteCartLine, RemoteCartStore},
};
use testresult::TestResult;
use uuid::Uuid;

const STOREFRONT: &str = r"
currency: EUR
products:
  1:
    name: Mug
    price: 45.00 EUR
  2:
    name: Lamp
    price: 80.00 EUR
";

struct Session {
    fixture: Arc<Fixture>,
    identity: SharedIdentity,
    cache: Arc<MemoryCache>,
    context: StorefrontContext,
}

fn session() -> TestResult<Session> {
    let fixture = Arc::new(Fixture::from_yaml(STOREFRONT)?);
    let identity = SharedIdentity::default();
    let cache = Arc::new(MemoryCache::new());

    let context = StorefrontContext::from_backend(
        &CheckoutConfig::default(),
        Arc::clone(&fixture),
        Arc::clone(&fixture),
        Frontend {
            identity: Arc::new(identity.clone()),
            cache: cache.clone(),
            navigator: Arc::new(RecordingNavigator::new()),
            notifier: Arc::new(ToastLog::new()),
        },
    );

    Ok(Session {
        fixture,
        identity,
        cache,
        context,
    })
}

fn shopper() -> UserId {
    UserId::from_uuid(Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0001))
}

#[tokio::test]
async fn signed_in_cart_is_read_from_the_remote_store() -> TestResult {
    let session = session()?;
    let user = shopper();

    session
        .fixture
        .replace_items(
            user,
            &[RemoteCartLine {
                product_id: ProductId::new(2),
                quantity: 3,
            }],
        )
        .await?;

    session.identity.set(Identity::SignedIn(user));

    let mut cart = session.context.cart_store();
    cart.load().await;

    assert_eq!(cart.item_count(), 3);
    assert_eq!(cart.total_price(), 24_000);
    assert_eq!(
        cart.items().first().map(|item| item.product.name.as_str()),
        Some("Lamp")
    );

    Ok(())
}

#[tokio::test]
async fn signed_in_changes_are_written_remotely() -> TestResult {
    let session = session()?;
    let user = shopper();
    session.identity.set(Identity::SignedIn(user));

    let mut cart = session.context.cart_store();
    cart.load().await;

    let mug = session
        .fixture
        .product(ProductId::new(1))
        .cloned()
        .ok_or("fixture product missing")?;

    cart.add_item(mug, 2);
    cart.flush().await;

    assert_eq!(
        session.fixture.list_items(user).await?,
        vec![RemoteCartLine {
            product_id: ProductId::new(1),
            quantity: 2,
        }]
    );

    Ok(())
}

#[tokio::test]
async fn signing_out_empties_the_cart_and_its_cached_copy() -> TestResult {
    let session = session()?;

    let mut cart = session.context.cart_store();
    cart.load().await;

    session.identity.set(Identity::SignedIn(shopper()));
    cart.sync_identity().await;

    let mug = session
        .fixture
        .product(ProductId::new(1))
        .cloned()
        .ok_or("fixture product missing")?;

    cart.add_item(mug, 1);
    cart.flush().await;

    session.identity.set(Identity::Anonymous);
    cart.sync_identity().await;

    assert!(cart.state().is_empty());

    let cached = session
        .cache
        .get(&format!("{}:{CART_KEY}", CheckoutConfig::default().cache_namespace))
        .await?;

    assert!(cached.is_none(), "cached cart should be gone");

    let mut reloaded = session.context.cart_store();
    reloaded.load().await;

    assert!(reloaded.state().is_empty());

    Ok(())
}

#[tokio::test]
async fn guest_cart_is_not_merged_on_sign_in() -> TestResult {
    let session = session()?;

    let mut cart = session.context.cart_store();
    cart.load().await;

    let lamp = session
        .fixture
        .product(ProductId::new(2))
        .cloned()
        .ok_or("fixture product missing")?;

    cart.add_item(lamp, 1);
    cart.flush().await;

    let user = shopper();
    session
        .fixture
        .replace_items(
            user,
            &[RemoteCartLine {
                product_id: ProductId::new(1),
                quantity: 1,
            }],
        )
        .await?;

    session.identity.set(Identity::SignedIn(user));
    cart.sync_identity().await;

    assert_eq!(cart.items().len(), 1);
    assert!(cart.state().get(ProductId::new(1)).is_some());
    assert!(cart.state().get(ProductId::new(2)).is_none());

    Ok(())
}
