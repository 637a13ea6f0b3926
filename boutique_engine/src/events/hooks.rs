use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderAddedEvent,
    PackageClosedEvent,
    PackageClosingSoonEvent,
    PackageOpenedEvent,
    PackageShippedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub package_opened_producer: Vec<EventProducer<PackageOpenedEvent>>,
    pub order_added_producer: Vec<EventProducer<OrderAddedEvent>>,
    pub package_closed_producer: Vec<EventProducer<PackageClosedEvent>>,
    pub package_shipped_producer: Vec<EventProducer<PackageShippedEvent>>,
    pub closing_soon_producer: Vec<EventProducer<PackageClosingSoonEvent>>,
}

pub struct EventHandlers {
    pub on_package_opened: Option<EventHandler<PackageOpenedEvent>>,
    pub on_order_added: Option<EventHandler<OrderAddedEvent>>,
    pub on_package_closed: Option<EventHandler<PackageClosedEvent>>,
    pub on_package_shipped: Option<EventHandler<PackageShippedEvent>>,
    pub on_closing_soon: Option<EventHandler<PackageClosingSoonEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_package_opened: hooks.on_package_opened.map(|f| EventHandler::new(buffer_size, f)),
            on_order_added: hooks.on_order_added.map(|f| EventHandler::new(buffer_size, f)),
            on_package_closed: hooks.on_package_closed.map(|f| EventHandler::new(buffer_size, f)),
            on_package_shipped: hooks.on_package_shipped.map(|f| EventHandler::new(buffer_size, f)),
            on_closing_soon: hooks.on_closing_soon.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_package_opened {
            result.package_opened_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_added {
            result.order_added_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_package_closed {
            result.package_closed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_package_shipped {
            result.package_shipped_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_closing_soon {
            result.closing_soon_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_package_opened {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_added {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_package_closed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_package_shipped {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_closing_soon {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_package_opened: Option<Handler<PackageOpenedEvent>>,
    pub on_order_added: Option<Handler<OrderAddedEvent>>,
    pub on_package_closed: Option<Handler<PackageClosedEvent>>,
    pub on_package_shipped: Option<Handler<PackageShippedEvent>>,
    pub on_closing_soon: Option<Handler<PackageClosingSoonEvent>>,
}

impl EventHooks {
    pub fn on_package_opened<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PackageOpenedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_package_opened = Some(Arc::new(f));
        self
    }

    pub fn on_order_added<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAddedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_added = Some(Arc::new(f));
        self
    }

    pub fn on_package_closed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PackageClosedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_package_closed = Some(Arc::new(f));
        self
    }

    pub fn on_package_shipped<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PackageShippedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_package_shipped = Some(Arc::new(f));
        self
    }

    pub fn on_closing_soon<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PackageClosingSoonEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_closing_soon = Some(Arc::new(f));
        self
    }
}
