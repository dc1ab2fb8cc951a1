//! BlueZ backend over the D-Bus system bus.
//!
//! Calls into bluetoothd go through [`dbus::nonblock::Proxy`] on a
//! `dbus-tokio` connection. The advertisement object is served by a match-rule
//! receiver on its object path which answers `Properties.GetAll` and
//! `LEAdvertisement1.Release`; every other call gets `UnknownMethod`.

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dbus::arg::{PropMap, RefArg, Variant};
use dbus::channel::{MatchingReceiver, Sender, Token};
use dbus::message::MatchRule;
use dbus::nonblock::stdintf::org_freedesktop_dbus::{ObjectManager, Properties};
use dbus::nonblock::{Proxy, SyncConnection};
use dbus::strings::ErrorName;
use dbus::{Message, Path};
use tracing::{debug, error, info, warn};

use crate::advertisement::Advertisement;
use crate::error::{AdvertError, Result};
use crate::names::{BusError, BusInterface, BLUEZ_ROOT_PATH, BLUEZ_SERVICE};
use crate::properties::{AdvertisementProperty, PropertyBag};
use crate::registration::AdvertisingManager;

/// [`AdvertisingManager`] backed by bluetoothd.
pub struct BluezManager {
    conn: Arc<SyncConnection>,
    timeout: Duration,
    exported: Mutex<HashMap<String, Token>>,
}

impl BluezManager {
    /// Connect to the system bus.
    ///
    /// Must be called from within a tokio runtime: the connection's I/O driver
    /// is spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertError::Bus`] if the system bus is unreachable.
    pub fn connect(timeout: Duration) -> Result<Self> {
        let (resource, conn) = dbus_tokio::connection::new_system_sync()?;
        tokio::spawn(async move {
            let err = resource.await;
            error!(error = %err, "Lost connection to the system bus");
        });
        info!(unique_name = %conn.unique_name(), "Connected to the system bus");
        Ok(Self::with_connection(conn, timeout))
    }

    /// Wrap an existing connection.
    #[must_use]
    pub fn with_connection(conn: Arc<SyncConnection>, timeout: Duration) -> Self {
        Self {
            conn,
            timeout,
            exported: Mutex::new(HashMap::new()),
        }
    }

    fn proxy<'a>(&self, path: impl Into<Path<'a>>) -> Proxy<'a, Arc<SyncConnection>> {
        Proxy::new(BLUEZ_SERVICE, path, self.timeout, Arc::clone(&self.conn))
    }

    fn adapter_proxy(&self, adapter: &str) -> Result<Proxy<'static, Arc<SyncConnection>>> {
        Ok(self.proxy(object_path(adapter)?))
    }
}

#[async_trait]
impl AdvertisingManager for BluezManager {
    async fn find_adapter(&self) -> Result<Option<String>> {
        let objects = self.proxy(BLUEZ_ROOT_PATH).get_managed_objects().await?;
        debug!(count = objects.len(), "Enumerated BlueZ managed objects");
        Ok(select_adapter(objects.into_iter().map(|(path, ifaces)| {
            (path.to_string(), ifaces.into_keys().collect::<Vec<_>>())
        })))
    }

    async fn power_on(&self, adapter: &str) -> Result<()> {
        self.adapter_proxy(adapter)?
            .set(BusInterface::Adapter.as_str(), "Powered", true)
            .await?;
        Ok(())
    }

    async fn adapter_roles(&self, adapter: &str) -> Result<Vec<String>> {
        let roles: Vec<String> = self
            .adapter_proxy(adapter)?
            .get(BusInterface::Adapter.as_str(), "Roles")
            .await?;
        Ok(roles)
    }

    fn export(&self, advertisement: Arc<Advertisement>) -> Result<()> {
        let path = object_path(advertisement.path())?;
        let key = path.to_string();
        let rule = MatchRule::new_method_call().with_path(path);

        let token = self.conn.start_receive(
            rule,
            Box::new(move |msg, conn| {
                let reply = dispatch(&advertisement, &msg);
                if !msg.get_no_reply() && conn.send(reply).is_err() {
                    warn!("Failed to queue reply on the system bus");
                }
                true
            }),
        );

        let previous = self
            .exported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), token);
        if let Some(previous) = previous {
            self.conn.stop_receive(previous);
        }
        debug!(path = %key, "Exported advertisement object");
        Ok(())
    }

    async fn register(&self, adapter: &str, path: &str) -> Result<()> {
        let path = object_path(path)?;
        self.adapter_proxy(adapter)?
            .method_call::<(), _, _, _>(
                BusInterface::LeAdvertisingManager.as_str(),
                "RegisterAdvertisement",
                (path, PropMap::new()),
            )
            .await
            .map_err(|e| AdvertError::RegistrationFailed(describe(&e)))
    }

    async fn unregister(&self, adapter: &str, path: &str) -> Result<()> {
        let path = object_path(path)?;
        self.adapter_proxy(adapter)?
            .method_call::<(), _, _, _>(
                BusInterface::LeAdvertisingManager.as_str(),
                "UnregisterAdvertisement",
                (path,),
            )
            .await?;
        Ok(())
    }

    fn detach(&self, path: &str) {
        let token = self
            .exported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        if let Some(token) = token {
            self.conn.stop_receive(token);
            debug!(%path, "Detached advertisement object");
        }
    }
}

/// First object path, in sorted order, exposing `org.bluez.LEAdvertisingManager1`.
///
/// Sorting keeps the choice stable (`hci0` before `hci1`) regardless of the
/// order the bus returns objects in.
pub(crate) fn select_adapter<I>(objects: I) -> Option<String>
where
    I: IntoIterator<Item = (String, Vec<String>)>,
{
    let manager = BusInterface::LeAdvertisingManager.as_str();
    objects
        .into_iter()
        .filter(|(_, ifaces)| ifaces.iter().any(|iface| iface == manager))
        .map(|(path, _)| path)
        .min()
}

/// Answer a method call addressed to the advertisement object.
pub(crate) fn dispatch(advertisement: &Advertisement, msg: &Message) -> Message {
    let interface = msg.interface();
    let member = msg.member();
    let call = (
        interface.as_deref().and_then(BusInterface::from_name),
        member.as_deref(),
    );

    match call {
        (Some(BusInterface::Properties), Some("GetAll")) => {
            let requested: &str = match msg.read1() {
                Ok(name) => name,
                Err(e) => return error_reply(msg, BusError::InvalidArgs, &e.to_string()),
            };
            debug!(interface = requested, "GetAll");
            match advertisement.get_all(requested) {
                Ok(bag) => msg.method_return().append1(to_prop_map(&bag)),
                Err(e) => {
                    warn!(error = %e, "Rejected property query");
                    error_reply(msg, e.bus_error(), &e.to_string())
                }
            }
        }
        (Some(BusInterface::LeAdvertisement), Some("Release")) => {
            info!(path = advertisement.path(), "Advertisement released");
            msg.method_return()
        }
        _ => error_reply(
            msg,
            BusError::UnknownMethod,
            &format!(
                "{}.{} is not implemented",
                interface.as_deref().unwrap_or_default(),
                member.as_deref().unwrap_or_default()
            ),
        ),
    }
}

/// Convert exported properties to a D-Bus `a{sv}` map.
pub(crate) fn to_prop_map(bag: &PropertyBag) -> PropMap {
    fn bytes_dict<K, I>(entries: I) -> HashMap<K, Variant<Vec<u8>>>
    where
        K: std::hash::Hash + Eq,
        I: IntoIterator<Item = (K, Vec<u8>)>,
    {
        entries.into_iter().map(|(k, v)| (k, Variant(v))).collect()
    }

    bag.iter()
        .map(|prop| {
            let value: Box<dyn RefArg> = match prop {
                AdvertisementProperty::Type(ad_type) => Box::new(ad_type.as_str().to_owned()),
                AdvertisementProperty::ServiceUuids(list)
                | AdvertisementProperty::SolicitUuids(list)
                | AdvertisementProperty::Includes(list) => Box::new(list.clone()),
                AdvertisementProperty::ManufacturerData(map) => {
                    Box::new(bytes_dict(map.iter().map(|(k, v)| (*k, v.clone()))))
                }
                AdvertisementProperty::ServiceData(map) => {
                    Box::new(bytes_dict(map.iter().map(|(k, v)| (k.clone(), v.clone()))))
                }
                AdvertisementProperty::LocalName(name) => Box::new(name.clone()),
                AdvertisementProperty::Data(map) => {
                    Box::new(bytes_dict(map.iter().map(|(k, v)| (*k, v.clone()))))
                }
            };
            (prop.name().to_owned(), Variant(value))
        })
        .collect()
}

fn object_path(path: &str) -> Result<Path<'static>> {
    Path::new(path.to_owned()).map_err(|_| AdvertError::InvalidObjectPath(path.to_owned()))
}

fn error_reply(msg: &Message, error: BusError, text: &str) -> Message {
    let text = CString::new(text.replace('\0', "")).unwrap_or_default();
    msg.error(&ErrorName::from(error.as_str()), &text)
}

fn describe(err: &dbus::Error) -> String {
    match (err.name(), err.message()) {
        (Some(name), Some(message)) => format!("{name}: {message}"),
        (Some(name), None) => name.to_owned(),
        (None, Some(message)) => message.to_owned(),
        (None, None) => "unknown error".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use dbus::arg::prop_cast;

    use super::*;
    use crate::advertisement::AdvertisingType;

    fn sample() -> Advertisement {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        ad.set_service_uuids(["cafe"]).unwrap();
        ad.add_manufacturer_data(0xffff, [0x00, 0x01, 0x02, 0x03])
            .add_service_data("9999", [0x00, 0x01, 0x02, 0x03, 0x04])
            .set_local_name("test_advertisement0")
            .set_include_tx_power(true)
            .add_data(0x26, [0x01, 0x01, 0x00]);
        ad
    }

    fn call(interface: &str, member: &str) -> Message {
        let mut msg = Message::new_method_call(
            ":1.42",
            "/org/bluez/example/advertisement0",
            interface,
            member,
        )
        .unwrap();
        msg.set_serial(7);
        msg
    }

    #[test]
    fn test_select_adapter_requires_manager_interface() {
        let objects = vec![
            ("/".to_owned(), vec!["org.freedesktop.DBus.ObjectManager".to_owned()]),
            ("/org/bluez/hci1".to_owned(), vec![
                "org.bluez.Adapter1".to_owned(),
                "org.bluez.LEAdvertisingManager1".to_owned(),
            ]),
            ("/org/bluez/hci0".to_owned(), vec![
                "org.bluez.Adapter1".to_owned(),
                "org.bluez.LEAdvertisingManager1".to_owned(),
            ]),
        ];
        assert_eq!(select_adapter(objects), Some("/org/bluez/hci0".to_owned()));
    }

    #[test]
    fn test_select_adapter_none_found() {
        let objects = vec![(
            "/org/bluez/hci0".to_owned(),
            vec!["org.bluez.Adapter1".to_owned()],
        )];
        assert_eq!(select_adapter(objects), None);
    }

    #[test]
    fn test_prop_map_signatures() {
        let map = to_prop_map(&sample().properties());
        assert_eq!(map.len(), 7);

        assert_eq!(prop_cast::<String>(&map, "Type").map(String::as_str), Some("peripheral"));
        assert_eq!(
            prop_cast::<Vec<String>>(&map, "ServiceUUIDs"),
            Some(&vec!["cafe".to_owned()])
        );
        assert_eq!(
            prop_cast::<Vec<String>>(&map, "Includes"),
            Some(&vec!["tx-power".to_owned()])
        );

        let manufacturer = prop_cast::<HashMap<u16, Variant<Vec<u8>>>>(&map, "ManufacturerData")
            .unwrap();
        assert_eq!(manufacturer[&0xffff].0, vec![0, 1, 2, 3]);

        let service = prop_cast::<HashMap<String, Variant<Vec<u8>>>>(&map, "ServiceData").unwrap();
        assert_eq!(service["9999"].0, vec![0, 1, 2, 3, 4]);

        let data = prop_cast::<HashMap<u8, Variant<Vec<u8>>>>(&map, "Data").unwrap();
        assert_eq!(data[&0x26].0, vec![1, 1, 0]);

        assert!(!map.contains_key("SolicitUUIDs"));
    }

    #[test]
    fn test_dispatch_get_all() {
        let msg = call("org.freedesktop.DBus.Properties", "GetAll")
            .append1("org.bluez.LEAdvertisement1");
        let reply = dispatch(&sample(), &msg);
        let props: PropMap = reply.read1().unwrap();
        assert_eq!(props.len(), 7);
        assert_eq!(
            props.get("LocalName").and_then(|v| v.0.as_str()),
            Some("test_advertisement0")
        );
    }

    #[test]
    fn test_dispatch_get_all_wrong_interface() {
        let msg = call("org.freedesktop.DBus.Properties", "GetAll")
            .append1("org.bluez.GattService1");
        let mut reply = dispatch(&sample(), &msg);
        let err = reply.as_result().unwrap_err();
        assert_eq!(err.name(), Some("org.freedesktop.DBus.Error.InvalidArgs"));
    }

    #[test]
    fn test_dispatch_release() {
        let mut reply = dispatch(&sample(), &call("org.bluez.LEAdvertisement1", "Release"));
        assert!(reply.as_result().is_ok());
    }

    #[test]
    fn test_dispatch_unknown_method() {
        let mut reply = dispatch(
            &sample(),
            &call("org.freedesktop.DBus.Properties", "Set"),
        );
        let err = reply.as_result().unwrap_err();
        assert_eq!(err.name(), Some("org.freedesktop.DBus.Error.UnknownMethod"));
    }

    #[test]
    fn test_invalid_object_path() {
        assert!(matches!(
            object_path("not/a/path"),
            Err(AdvertError::InvalidObjectPath(_))
        ));
        assert!(object_path("/org/bluez/hci0").is_ok());
    }
}
